use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

use qrecall_config::RerankProviderConfig;

/// Scores `docs` against `query`.
///
/// The result is aligned with `docs`; `None` marks a document the reranker did not score.
pub async fn rerank(
	cfg: &RerankProviderConfig,
	query: &str,
	docs: &[String],
	top_k: u32,
) -> Result<Vec<Option<f32>>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = crate::endpoint(&cfg.api_base, &cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"query": query,
		"documents": docs,
		"top_k": top_k,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_rerank_response(json, docs.len())
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<Option<f32>>> {
	let mut scores = vec![None; doc_count];
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Rerank response is missing results array."))?;

	for item in results {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.ok_or_else(|| eyre::eyre!("Rerank result missing index."))? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| eyre::eyre!("Rerank result missing score."))? as f32;

		match scores.get_mut(index) {
			Some(slot) => *slot = Some(score),
			None => tracing::warn!(index, doc_count, "Reranker returned an out-of-range index."),
		}
	}

	Ok(scores)
}
