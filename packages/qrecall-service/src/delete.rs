use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, RecallService, Result};
use qrecall_storage::models::{DeleteOutcome, DeleteSelector};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeleteRequest {
	pub collection_name: Option<String>,
	pub point_ids: Option<Vec<String>>,
	pub query_filter: Option<Value>,
	/// Typed filter arguments, keyed by filterable field name.
	#[serde(flatten)]
	pub filter_arguments: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeleteResponse {
	pub collection: String,
	/// `deleted_nothing` when the collection does not exist.
	pub status: String,
	pub operation_id: Option<u64>,
}

impl RecallService {
	/// Deletes points selected by exactly one of `point_ids` or `query_filter`.
	pub async fn delete(&self, req: DeleteRequest) -> Result<DeleteResponse> {
		self.ensure_writable("delete")?;

		let filter = self.request_filter(req.query_filter.as_ref(), &req.filter_arguments)?;
		let selector = match (req.point_ids, filter) {
			(Some(_), Some(_)) =>
				return Err(Error::InvalidRequest {
					message: "Provide either point_ids or a filter, not both.".to_string(),
				}),
			(None, None) =>
				return Err(Error::InvalidRequest {
					message: "Either point_ids or a filter is required.".to_string(),
				}),
			(Some(ids), None) => {
				if ids.is_empty() {
					return Err(Error::InvalidRequest {
						message: "point_ids must be non-empty.".to_string(),
					});
				}
				if let Some(index) = ids.iter().position(|id| id.trim().is_empty()) {
					return Err(Error::InvalidRequest {
						message: format!("point_ids[{index}] must be non-empty."),
					});
				}

				DeleteSelector::Ids(ids)
			},
			(None, Some(filter)) => DeleteSelector::Filter(filter),
		};
		let collection = self.target_collection(req.collection_name.as_deref())?;

		if !self.store.collection_exists(&collection).await? {
			tracing::warn!(collection = %collection, "Collection does not exist. Nothing deleted.");

			return Ok(DeleteResponse {
				collection,
				status: "deleted_nothing".to_string(),
				operation_id: None,
			});
		}

		let outcome = self.store.delete(&collection, selector).await?;

		tracing::info!(
			collection = %collection,
			status = %outcome.status,
			"Deleted points."
		);

		let DeleteOutcome { status, operation_id } = outcome;

		Ok(DeleteResponse { collection, status, operation_id })
	}
}
