use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Embeds one search query with an OpenAI-compatible embeddings endpoint.
pub async fn embed_query(
	cfg: &feed_config::EmbeddingProviderConfig,
	text: &str,
) -> Result<Vec<f32>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": [text],
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_query_embedding(&json, cfg.dimensions)
}

fn parse_query_embedding(json: &Value, dimensions: u32) -> Result<Vec<f32>> {
	let embedding = json
		.get("data")
		.and_then(Value::as_array)
		.and_then(|data| data.first())
		.and_then(|item| item.get("embedding"))
		.and_then(Value::as_array)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Embedding response is missing data[0].embedding.".to_string(),
		})?;

	if embedding.len() != dimensions as usize {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding has {} dimensions, expected {dimensions}.",
				embedding.len()
			),
		});
	}

	embedding
		.iter()
		.map(|value| {
			value.as_f64().map(|number| number as f32).ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})
		})
		.collect()
}
