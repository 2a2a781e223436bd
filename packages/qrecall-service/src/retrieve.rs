use serde::{Deserialize, Serialize};

use crate::{Entry, Error, RecallService, Result};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RetrieveRequest {
	pub point_id: String,
	pub collection_name: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RetrieveResponse {
	pub collection: String,
	pub entry: Option<Entry>,
}

impl RecallService {
	/// Looks a point up by id. Does not embed.
	pub async fn retrieve(&self, req: RetrieveRequest) -> Result<RetrieveResponse> {
		let point_id = req.point_id.trim();

		if point_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: "point_id must be non-empty.".to_string(),
			});
		}

		let collection = self.target_collection(req.collection_name.as_deref())?;

		if !self.store.collection_exists(&collection).await? {
			tracing::debug!(collection = %collection, "Collection does not exist. Nothing retrieved.");

			return Ok(RetrieveResponse { collection, entry: None });
		}

		let entry = self
			.store
			.retrieve(&collection, point_id)
			.await?
			.map(|point| Entry::from_payload(point.id, None, point.payload));

		Ok(RetrieveResponse { collection, entry })
	}
}
