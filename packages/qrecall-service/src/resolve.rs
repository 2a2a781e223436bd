//! Turns the collection selectors of a request into the ordered list of collections to search.

use std::future::Future;

use crate::{Error, RecallService, Result};

/// Selects every collection known to Qdrant.
pub const WILDCARD: &str = "*";

/// Resolves the collections a request targets.
///
/// Precedence: an explicit list (the wildcard anywhere in it expands to `enumerate()`), then the
/// legacy single collection, then the configured default. Explicit lists are kept verbatim,
/// duplicates and blank names included. Wildcard results keep enumeration order, which carries
/// no meaning.
pub async fn resolve<F, Fut>(
	explicit: Option<&[String]>,
	legacy: Option<&str>,
	default: Option<&str>,
	enumerate: F,
) -> Result<Vec<String>>
where
	F: FnOnce() -> Fut,
	Fut: Future<Output = Result<Vec<String>>>,
{
	if let Some(explicit) = explicit.filter(|names| !names.is_empty()) {
		if explicit.iter().any(|name| name == WILDCARD) {
			return enumerate().await;
		}

		return Ok(explicit.to_vec());
	}
	if let Some(legacy) = legacy {
		return Ok(vec![legacy.to_string()]);
	}

	match default {
		Some(default) => Ok(vec![default.to_string()]),
		None => Err(Error::InvalidRequest {
			message:
				"collections, collection_name, or a configured default collection is required."
					.to_string(),
		}),
	}
}

impl RecallService {
	pub async fn resolve_collections(
		&self,
		explicit: Option<&[String]>,
		legacy: Option<&str>,
	) -> Result<Vec<String>> {
		let default = self.cfg.storage.qdrant.default_collection.as_deref();

		resolve(explicit, legacy, default, || async {
			let collections = self.store.list_collections().await?;

			tracing::debug!(count = collections.len(), "Enumerated collections for wildcard.");

			Ok::<_, Error>(collections)
		})
		.await
	}
}
