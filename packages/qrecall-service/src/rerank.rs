//! Optional second-pass reordering of a merged pool.

use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{Entry, RankedPool, RecallService};

const EXPIRED_DECAY: f32 = 0.3;
const NEAR_EXPIRY_DECAY: f32 = 0.7;
const NEAR_EXPIRY_RATIO: f64 = 0.8;

#[derive(Debug)]
pub struct Reranked {
	pub pool: RankedPool,
	/// Set when the reranker could not be used and `pool` is the input pool unchanged.
	pub warning: Option<String>,
}

impl RecallService {
	/// Reranks `pool` and keeps at most `min(limit, providers.rerank.top_k)` entries.
	///
	/// Any reranker failure returns the input pool together with a warning.
	pub async fn rerank(
		&self,
		query: &str,
		pool: RankedPool,
		limit: usize,
		now: OffsetDateTime,
	) -> Reranked {
		let cfg = &self.cfg.providers.rerank;

		if !cfg.enabled {
			let warning = "Reranking was requested but providers.rerank is disabled.".to_string();

			tracing::warn!("{warning}");

			return Reranked { pool, warning: Some(warning) };
		}
		if pool.is_empty() {
			return Reranked { pool, warning: None };
		}

		let top_k = limit.min(cfg.top_k as usize);
		let docs: Vec<String> = pool.as_slice().iter().map(|entry| entry.content.clone()).collect();

		match self.providers.rerank.rerank(cfg, query, &docs, top_k as u32).await {
			Ok(scores) if scores.len() == docs.len() => {
				let reranked = apply_scores(pool, scores, top_k, now);

				tracing::info!(
					candidates = docs.len(),
					kept = reranked.len(),
					"Reranked merged results."
				);

				Reranked { pool: reranked, warning: None }
			},
			Ok(scores) => {
				let warning = format!(
					"Reranking skipped: reranker returned {} scores for {} candidates.",
					scores.len(),
					docs.len()
				);

				tracing::warn!("{warning}");

				Reranked { pool, warning: Some(warning) }
			},
			Err(err) => {
				tracing::warn!(error = %err, "Reranking failed. Returning unreranked results.");

				Reranked { pool, warning: Some(format!("Reranking skipped: {err}")) }
			},
		}
	}
}

/// Replaces each scored entry's score with its (decayed) rerank score and drops unscored ones.
///
/// The retrieval score moves to `metadata.vector_score`.
pub(crate) fn apply_scores(
	pool: RankedPool,
	scores: Vec<Option<f32>>,
	top_k: usize,
	now: OffsetDateTime,
) -> RankedPool {
	let mut kept = Vec::with_capacity(pool.len());

	for (mut entry, score) in pool.into_inner().into_iter().zip(scores) {
		let Some(score) = score else { continue };
		let adjusted = score * ttl_decay(&entry, now);
		let metadata = entry.metadata.get_or_insert_with(Map::new);

		if let Some(previous) = entry.score.filter(|score| score.is_finite()) {
			metadata.insert("vector_score".to_string(), Value::from(previous));
		}

		metadata.insert("rerank_score".to_string(), Value::from(adjusted));
		metadata.insert("reranked".to_string(), Value::Bool(true));

		entry.score = Some(adjusted);

		kept.push(entry);
	}

	RankedPool::from_unsorted(kept, top_k)
}

/// Score multiplier for working memories that are past or near their TTL.
pub(crate) fn ttl_decay(entry: &Entry, now: OffsetDateTime) -> f32 {
	let Some(metadata) = entry.metadata.as_ref() else { return 1.0 };

	if metadata.get("memory_type").and_then(Value::as_str) != Some("working") {
		return 1.0;
	}

	let Some(ttl_days) = metadata.get("ttl_days").and_then(Value::as_f64).filter(|ttl| *ttl > 0.0)
	else {
		return 1.0;
	};
	let Some(timestamp) = metadata.get("timestamp").and_then(Value::as_str) else { return 1.0 };
	let created = match OffsetDateTime::parse(timestamp, &Rfc3339) {
		Ok(created) => created,
		Err(err) => {
			tracing::warn!(
				error = %err,
				id = entry.id.as_deref().unwrap_or("unknown"),
				"Failed to parse memory timestamp. Skipping TTL decay."
			);

			return 1.0;
		},
	};
	let age_days = (now - created).whole_days() as f64;

	if age_days > ttl_days {
		EXPIRED_DECAY
	} else if age_days > ttl_days * NEAR_EXPIRY_RATIO {
		NEAR_EXPIRY_DECAY
	} else {
		1.0
	}
}
