use std::{collections::HashMap, sync::RwLock};

use feed_domain::{
	Collection, Document,
	pipeline::{Predicate, Query},
};

use crate::{
	Result,
	store::{BoxFuture, DocumentStore, document_id},
};

/// In-process store with the same query semantics as the Postgres store.
#[derive(Debug, Default)]
pub struct MemoryStore {
	collections: RwLock<HashMap<Collection, Vec<Document>>>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self, collection: Collection) -> usize {
		let collections = self.collections.read().unwrap_or_else(|err| err.into_inner());

		collections.get(&collection).map(Vec::len).unwrap_or(0)
	}

	fn upsert(&self, collection: Collection, doc: Document) -> Result<()> {
		let id = document_id(&doc)?;
		let mut collections = self.collections.write().unwrap_or_else(|err| err.into_inner());
		let docs = collections.entry(collection).or_default();

		match docs.iter_mut().find(|existing| document_id(existing).ok() == Some(id)) {
			Some(existing) => *existing = doc,
			None => docs.push(doc),
		}

		Ok(())
	}

	fn scan(&self, collection: Collection, query: &Query) -> Vec<Document> {
		let collections = self.collections.read().unwrap_or_else(|err| err.into_inner());

		collections.get(&collection).map(|docs| query.apply(docs.iter())).unwrap_or_default()
	}
}
impl DocumentStore for MemoryStore {
	fn find<'a>(
		&'a self,
		collection: Collection,
		query: &'a Query,
	) -> BoxFuture<'a, Result<Vec<Document>>> {
		Box::pin(async move { Ok(self.scan(collection, query)) })
	}

	fn count<'a>(
		&'a self,
		collection: Collection,
		predicate: &'a Predicate,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let query = Query::filter(predicate.clone());

			Ok(self.scan(collection, &query).len() as u64)
		})
	}

	fn insert<'a>(&'a self, collection: Collection, doc: Document) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.upsert(collection, doc) })
	}
}
