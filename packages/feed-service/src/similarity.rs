//! Nearest-neighbour lookups against the dense vectors stored in Qdrant.

use std::sync::Arc;

use feed_domain::Collection;
use feed_storage::qdrant::{DENSE_VECTOR_NAME, QdrantStore};
use qdrant_client::qdrant::{
	Condition, Filter, GetPointsBuilder, PointId, Query, QueryPointsBuilder, ScoredPoint,
	VectorInput, point_id::PointIdOptions,
};
use uuid::Uuid;

use crate::{BoxFuture, Neighbor, Result, SimilarityProvider};

/// Payload field naming the collection a point was indexed from.
pub const KIND_PAYLOAD_FIELD: &str = "kind";

pub struct QdrantSimilarity {
	qdrant: Arc<QdrantStore>,
}
impl QdrantSimilarity {
	pub fn new(qdrant: Arc<QdrantStore>) -> Self {
		Self { qdrant }
	}

	async fn nearest(
		&self,
		kind: Collection,
		reference: Uuid,
		top_k: u32,
	) -> Result<Option<Vec<Neighbor>>> {
		let point_id = PointId::from(reference.to_string());
		let existing = self
			.qdrant
			.client
			.get_points(
				GetPointsBuilder::new(self.qdrant.collection.clone(), vec![point_id.clone()])
					.with_payload(false)
					.with_vectors(false),
			)
			.await?;

		if existing.result.is_empty() {
			return Ok(None);
		}

		let search = QueryPointsBuilder::new(self.qdrant.collection.clone())
			.query(Query::new_nearest(VectorInput::new_id(point_id)))
			.using(DENSE_VECTOR_NAME)
			.filter(kind_filter(kind))
			.limit(u64::from(top_k) + 1);
		let response = self.qdrant.client.query(search).await?;
		let neighbors = neighbors(&response.result)
			.into_iter()
			.filter(|neighbor| neighbor.id != reference)
			.take(top_k as usize)
			.collect();

		Ok(Some(neighbors))
	}
}
impl SimilarityProvider for QdrantSimilarity {
	fn similar<'a>(
		&'a self,
		kind: Collection,
		reference: Uuid,
		top_k: u32,
	) -> BoxFuture<'a, Result<Option<Vec<Neighbor>>>> {
		Box::pin(self.nearest(kind, reference, top_k))
	}
}

pub(crate) fn kind_filter(kind: Collection) -> Filter {
	Filter::must([Condition::matches(KIND_PAYLOAD_FIELD, kind.as_str().to_string())])
}

pub(crate) fn neighbors(points: &[ScoredPoint]) -> Vec<Neighbor> {
	points
		.iter()
		.filter_map(|point| {
			let id = point.id.as_ref().and_then(point_id_to_uuid)?;

			Some(Neighbor { id, score: f64::from(point.score) })
		})
		.collect()
}

fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}
