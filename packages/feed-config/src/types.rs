use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub feed: Feed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	/// Collection holding one dense vector per feed document, keyed by document id.
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Feed {
	pub default_limit: u32,
	pub max_limit: u32,
	/// Per-followee document cap applied before the follow-graph union. The effective cap is
	/// never lower than the requested page size.
	pub following_cap: u32,
	pub similarity_top_k: u32,
	pub search_top_k: u32,
	/// Upper bound for a single nearest-neighbour or search call made while serving a request.
	pub collaborator_timeout_ms: u64,
}
impl Default for Feed {
	fn default() -> Self {
		Self {
			default_limit: 100,
			max_limit: 1_000,
			following_cap: 100,
			similarity_top_k: 500,
			search_top_k: 500,
			collaborator_timeout_ms: 3_000,
		}
	}
}
