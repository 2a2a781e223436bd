//! The `find` pipeline: resolve, fan out, merge, optionally rerank, format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{
	CollectionFailure, Entry, Error, RankedPool, RecallService, ResponseMode, Result, format, merge,
};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FindRequest {
	pub query: String,
	pub collection_name: Option<String>,
	pub collections: Option<Vec<String>>,
	pub mode: Option<String>,
	pub limit: Option<i64>,
	pub query_filter: Option<Value>,
	#[serde(default)]
	pub rerank: bool,
	/// Typed filter arguments, keyed by filterable field name.
	#[serde(flatten)]
	pub filter_arguments: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FindResponse {
	pub query: String,
	pub mode: ResponseMode,
	pub collections: Vec<String>,
	pub entries: Vec<Entry>,
	/// One rendered line or block per entry, aligned with `entries`.
	pub lines: Vec<String>,
	pub failures: Vec<CollectionFailure>,
	pub warnings: Vec<String>,
}
impl FindResponse {
	fn empty(query: String, mode: ResponseMode, collections: Vec<String>) -> Self {
		Self {
			query,
			mode,
			collections,
			entries: Vec::new(),
			lines: Vec::new(),
			failures: Vec::new(),
			warnings: Vec::new(),
		}
	}
}

impl RecallService {
	pub async fn find(&self, req: FindRequest) -> Result<FindResponse> {
		if req.query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let mode = match req.mode.as_deref() {
			Some(raw) => raw.parse::<ResponseMode>()?,
			None => ResponseMode::default(),
		};
		let filter = self.request_filter(req.query_filter.as_ref(), &req.filter_arguments)?;
		let limit = req.limit.unwrap_or(i64::from(self.cfg.search.default_limit));
		let collections = self
			.resolve_collections(req.collections.as_deref(), req.collection_name.as_deref())
			.await?;

		tracing::debug!(
			collections = collections.len(),
			limit,
			mode = mode.as_str(),
			rerank = req.rerank,
			"Resolved find request."
		);

		if limit <= 0 || collections.is_empty() {
			return Ok(FindResponse::empty(req.query, mode, collections));
		}

		let per_collection_limit = limit as u64;
		let outcomes =
			self.search_all(&req.query, &collections, per_collection_limit, filter.as_ref()).await?;
		let merged = merge::merge(outcomes, collections.len(), limit, &self.cfg.search);
		let mut warnings = Vec::new();
		let pool = if req.rerank {
			let reranked = self
				.rerank(&req.query, merged.pool, limit as usize, OffsetDateTime::now_utc())
				.await;

			warnings.extend(reranked.warning);

			reranked.pool
		} else {
			merged.pool
		};

		Ok(self.respond(req.query, mode, collections, pool, merged.failures, warnings))
	}

	fn respond(
		&self,
		query: String,
		mode: ResponseMode,
		collections: Vec<String>,
		pool: RankedPool,
		failures: Vec<CollectionFailure>,
		warnings: Vec<String>,
	) -> FindResponse {
		let lines = format::format(&pool, mode, &self.cfg.search.minimal_fields);

		tracing::info!(
			collections = collections.len(),
			results = pool.len(),
			failures = failures.len(),
			"Find request completed."
		);

		FindResponse {
			query,
			mode,
			collections,
			entries: pool.into_inner(),
			lines,
			failures,
			warnings,
		}
	}
}
