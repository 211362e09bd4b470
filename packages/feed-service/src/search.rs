//! Free-text search: embed the query, then a nearest-neighbour query over the same index.

use std::sync::Arc;

use feed_config::EmbeddingProviderConfig;
use feed_domain::Collection;
use feed_providers::embedding;
use feed_storage::qdrant::{DENSE_VECTOR_NAME, QdrantStore};
use qdrant_client::qdrant::{Query, QueryPointsBuilder};

use crate::{
	BoxFuture, Error, Neighbor, Result, SearchProvider,
	similarity::{kind_filter, neighbors},
};

pub struct QdrantSearch {
	qdrant: Arc<QdrantStore>,
	embedding: EmbeddingProviderConfig,
}
impl QdrantSearch {
	pub fn new(qdrant: Arc<QdrantStore>, embedding: EmbeddingProviderConfig) -> Self {
		Self { qdrant, embedding }
	}

	async fn run(&self, kind: Collection, text: &str, top_k: u32) -> Result<Vec<Neighbor>> {
		let vector = embedding::embed_query(&self.embedding, text).await?;

		if vector.len() != self.qdrant.vector_dim as usize {
			return Err(Error::Provider {
				message: format!(
					"Embedding has {} dimensions, the index expects {}.",
					vector.len(),
					self.qdrant.vector_dim
				),
			});
		}

		let search = QueryPointsBuilder::new(self.qdrant.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.filter(kind_filter(kind))
			.limit(u64::from(top_k));
		let response = self.qdrant.client.query(search).await?;

		Ok(neighbors(&response.result))
	}
}
impl SearchProvider for QdrantSearch {
	fn search<'a>(
		&'a self,
		kind: Collection,
		text: &'a str,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		Box::pin(self.run(kind, text, top_k))
	}
}
