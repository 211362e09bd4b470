use std::{future::Future, pin::Pin};

use feed_domain::{
	Collection, Document,
	pipeline::{ID_FIELD, Predicate, Query, Scalar, ValueKind},
};
use uuid::Uuid;

use crate::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The primitive every document store provides: atomic single-document writes and a filtered,
/// sorted, bounded scan of one collection.
pub trait DocumentStore: Send + Sync {
	fn find<'a>(
		&'a self,
		collection: Collection,
		query: &'a Query,
	) -> BoxFuture<'a, Result<Vec<Document>>>;

	fn count<'a>(
		&'a self,
		collection: Collection,
		predicate: &'a Predicate,
	) -> BoxFuture<'a, Result<u64>>;

	/// Inserts or replaces the document with the same `_id`.
	fn insert<'a>(&'a self, collection: Collection, doc: Document) -> BoxFuture<'a, Result<()>>;
}

pub(crate) fn document_id(doc: &Document) -> Result<Uuid> {
	match doc.get(ID_FIELD).and_then(|value| ValueKind::Id.decode(value)) {
		Some(Scalar::Id(id)) => Ok(id),
		_ => Err(Error::InvalidArgument(format!("Document {ID_FIELD} must be a UUID string."))),
	}
}
