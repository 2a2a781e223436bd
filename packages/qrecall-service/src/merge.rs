//! Flattens per-collection outcomes into one ranked, bounded pool.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Entry, SearchOutcome};
use qrecall_config::{PriorityStrategy, Search};

/// Entries sorted by non-increasing score and truncated to the output budget.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankedPool(Vec<Entry>);
impl RankedPool {
	pub fn as_slice(&self) -> &[Entry] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn into_inner(self) -> Vec<Entry> {
		self.0
	}

	/// Stable sort, so equal scores keep their current relative order.
	pub(crate) fn from_unsorted(mut entries: Vec<Entry>, budget: usize) -> Self {
		entries.sort_by(|a, b| rank_score(b).total_cmp(&rank_score(a)));
		entries.truncate(budget);

		Self(entries)
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CollectionFailure {
	pub collection: String,
	pub message: String,
}

#[derive(Debug, Default)]
pub struct Merged {
	pub pool: RankedPool,
	pub failures: Vec<CollectionFailure>,
}

/// How many merged entries a request may return.
///
/// A single collection returns at most `limit`. Several collections return up to
/// `limit * min(collections, multiplier)`.
pub fn output_budget(limit: i64, collections: usize, multiplier: u32) -> usize {
	let Ok(limit) = usize::try_from(limit) else { return 0 };

	if collections > 1 {
		limit.saturating_mul(collections.min(multiplier as usize))
	} else {
		limit
	}
}

/// Score multiplier for an entry from `collection`. Earlier entries in `order` weigh more.
pub fn priority_boost(collection: &str, order: &[String], strategy: PriorityStrategy) -> f32 {
	let Some(factor) = strategy.boost_factor() else { return 1.0 };
	let Some(index) = order.iter().position(|name| name == collection) else { return 1.0 };

	factor.powi((order.len() - index) as i32)
}

pub fn merge(
	outcomes: Vec<SearchOutcome>,
	collections_in_request: usize,
	limit: i64,
	search: &Search,
) -> Merged {
	let mut pool = Vec::new();
	let mut failures = Vec::new();

	for outcome in outcomes {
		match outcome {
			SearchOutcome::Hits { collection, entries } =>
				for mut entry in entries {
					attach_collection(&mut entry, &collection);

					let boost =
						priority_boost(&collection, &search.priority_order, search.priority_strategy);

					entry.score = Some(normalized_score(entry.score) * boost);

					pool.push(entry);
				},
			SearchOutcome::Failed { collection, error } => {
				tracing::warn!(
					collection = %collection,
					error = %error,
					"Collection search failed. Continuing with remaining collections."
				);

				failures.push(CollectionFailure { collection, message: error.to_string() });
			},
		}
	}

	let budget =
		output_budget(limit, collections_in_request, search.multi_collection_limit_multiplier);

	Merged { pool: RankedPool::from_unsorted(pool, budget), failures }
}

pub(crate) fn rank_score(entry: &Entry) -> f32 {
	normalized_score(entry.score)
}

/// Missing and NaN scores rank below every real score.
fn normalized_score(score: Option<f32>) -> f32 {
	match score {
		Some(score) if !score.is_nan() => score,
		_ => f32::NEG_INFINITY,
	}
}

fn attach_collection(entry: &mut Entry, collection: &str) {
	entry
		.metadata
		.get_or_insert_with(Map::new)
		.insert("collection".to_string(), Value::String(collection.to_string()));
}
