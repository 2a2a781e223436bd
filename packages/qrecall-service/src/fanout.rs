//! Concurrent nearest-neighbour search across every resolved collection.

use qdrant_client::qdrant::Filter;

use crate::{Entry, Error, RecallService, Result, VectorStore};
use qrecall_storage::models::SearchQuery;

/// The result of searching one collection. Failures stay values so siblings are unaffected.
#[derive(Debug)]
pub enum SearchOutcome {
	Hits { collection: String, entries: Vec<Entry> },
	Failed { collection: String, error: Error },
}
impl SearchOutcome {
	pub fn collection(&self) -> &str {
		match self {
			Self::Hits { collection, .. } | Self::Failed { collection, .. } => collection,
		}
	}
}

impl RecallService {
	/// Embeds `query` once and searches every collection concurrently.
	///
	/// Output index `i` always describes `collections[i]`. Only the embedding call can fail the
	/// whole operation.
	pub async fn search_all(
		&self,
		query: &str,
		collections: &[String],
		per_collection_limit: u64,
		filter: Option<&Filter>,
	) -> Result<Vec<SearchOutcome>> {
		if collections.is_empty() {
			return Ok(Vec::new());
		}

		let vector = self.embed_one(query).await?;
		let vector_name = self.cfg.providers.embedding.vector_name.as_str();
		let store = self.store.as_ref();
		let searches = collections.iter().map(|collection| {
			search_one(store, collection, &vector, vector_name, per_collection_limit, filter)
		});

		Ok(futures::future::join_all(searches).await)
	}
}

async fn search_one(
	store: &dyn VectorStore,
	collection: &str,
	vector: &[f32],
	vector_name: &str,
	limit: u64,
	filter: Option<&Filter>,
) -> SearchOutcome {
	match search_collection(store, collection, vector, vector_name, limit, filter).await {
		Ok(entries) => SearchOutcome::Hits { collection: collection.to_string(), entries },
		Err(error) => SearchOutcome::Failed { collection: collection.to_string(), error },
	}
}

async fn search_collection(
	store: &dyn VectorStore,
	collection: &str,
	vector: &[f32],
	vector_name: &str,
	limit: u64,
	filter: Option<&Filter>,
) -> Result<Vec<Entry>> {
	if !store.collection_exists(collection).await? {
		tracing::warn!(collection = %collection, "Collection does not exist. Skipping search.");

		return Ok(Vec::new());
	}

	let hits = store
		.search(SearchQuery {
			collection,
			vector: vector.to_vec(),
			vector_name,
			limit,
			filter: filter.cloned(),
		})
		.await?;

	tracing::debug!(collection = %collection, hits = hits.len(), "Collection search finished.");

	Ok(hits
		.into_iter()
		.map(|hit| Entry::from_payload(hit.id, Some(hit.score), hit.payload))
		.collect())
}
