pub mod feed;
pub mod list;
pub mod response;
pub mod search;
pub mod similarity;

mod error;

use std::{future::Future, pin::Pin, sync::Arc};

use feed_config::EmbeddingProviderConfig;
use feed_domain::Collection;
use feed_storage::{DocumentStore, qdrant::QdrantStore};
use uuid::Uuid;

pub use error::{Error, Result};
pub use feed::FeedRequest;
pub use list::ListRequest;
pub use response::{FeedResponse, ListResponse};
pub use search::QdrantSearch;
pub use similarity::QdrantSimilarity;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One id returned by a collaborator, with its relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
	pub id: Uuid,
	pub score: f64,
}

pub trait SimilarityProvider
where
	Self: Send + Sync,
{
	/// Nearest neighbours of `reference` among documents of `kind`. `None` means the reference has
	/// no vector.
	fn similar<'a>(
		&'a self,
		kind: Collection,
		reference: Uuid,
		top_k: u32,
	) -> BoxFuture<'a, Result<Option<Vec<Neighbor>>>>;
}

pub trait SearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		kind: Collection,
		text: &'a str,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>>;
}

pub struct Providers {
	pub similarity: Arc<dyn SimilarityProvider>,
	pub search: Arc<dyn SearchProvider>,
}
impl Providers {
	/// Qdrant-backed collaborators. Search embeds the query text first.
	pub fn qdrant(qdrant: Arc<QdrantStore>, embedding: EmbeddingProviderConfig) -> Self {
		Self {
			similarity: Arc::new(QdrantSimilarity::new(qdrant.clone())),
			search: Arc::new(QdrantSearch::new(qdrant, embedding)),
		}
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(NoCollaborators);

		Self { similarity: provider.clone(), search: provider }
	}
}

pub struct FeedService {
	pub cfg: feed_config::Feed,
	pub store: Arc<dyn DocumentStore>,
	pub providers: Providers,
}
impl FeedService {
	pub fn new(cfg: feed_config::Feed, store: Arc<dyn DocumentStore>) -> Self {
		Self { cfg, store, providers: Providers::default() }
	}

	pub fn with_providers(
		cfg: feed_config::Feed,
		store: Arc<dyn DocumentStore>,
		providers: Providers,
	) -> Self {
		Self { cfg, store, providers }
	}
}

/// Collaborators for deployments without a vector index. Every lookup resolves to nothing.
struct NoCollaborators;

impl SimilarityProvider for NoCollaborators {
	fn similar<'a>(
		&'a self,
		_: Collection,
		_: Uuid,
		_: u32,
	) -> BoxFuture<'a, Result<Option<Vec<Neighbor>>>> {
		Box::pin(async { Ok(None) })
	}
}

impl SearchProvider for NoCollaborators {
	fn search<'a>(
		&'a self,
		_: Collection,
		_: &'a str,
		_: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}
