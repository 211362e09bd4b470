use std::sync::Arc;

use feed_service::{FeedService, Providers};
use feed_storage::{db::Db, pg::PgStore, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<FeedService>,
}
impl AppState {
	pub async fn new(config: feed_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = Arc::new(QdrantStore::new(&config.storage.qdrant)?);
		let providers = Providers::qdrant(qdrant, config.providers.embedding.clone());
		let store = Arc::new(PgStore::new(db.pool.clone()));
		let service = FeedService::with_providers(config.feed, store, providers);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: FeedService) -> Self {
		Self { service: Arc::new(service) }
	}
}
