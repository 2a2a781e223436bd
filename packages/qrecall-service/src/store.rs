use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{DOCUMENT_FIELD, Error, METADATA_FIELD, RecallService, Result};
use qrecall_storage::models::NewPoint;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StoreRequest {
	pub information: String,
	pub collection_name: Option<String>,
	pub metadata: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StoreResponse {
	pub collection: String,
	pub point_id: String,
	/// Whether this call created the collection.
	pub created_collection: bool,
}

impl RecallService {
	/// Embeds `information` and writes it as a new point, creating the collection on first use.
	pub async fn store(&self, req: StoreRequest) -> Result<StoreResponse> {
		self.ensure_writable("store")?;

		if req.information.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: "information must be non-empty.".to_string(),
			});
		}

		let collection = self.target_collection(req.collection_name.as_deref())?;
		let vector = self.embed_one(&req.information).await?;
		let qdrant = &self.cfg.storage.qdrant;
		let vector_name = self.cfg.providers.embedding.vector_name.as_str();
		let created_collection = self
			.store
			.ensure_collection(&collection, vector_name, qdrant.vector_dim, &qdrant.index_plan())
			.await?;
		let point_id = Uuid::new_v4().to_string();
		let mut payload = Map::new();

		payload.insert(DOCUMENT_FIELD.to_string(), Value::String(req.information));
		payload.insert(
			METADATA_FIELD.to_string(),
			req.metadata.map(Value::Object).unwrap_or(Value::Null),
		);

		self.store
			.upsert(NewPoint {
				collection: &collection,
				id: point_id.clone(),
				vector_name,
				vector,
				payload,
			})
			.await?;

		tracing::info!(collection = %collection, point_id = %point_id, "Stored entry.");

		Ok(StoreResponse { collection, point_id, created_collection })
	}

	pub(crate) fn ensure_writable(&self, operation: &str) -> Result<()> {
		if self.cfg.service.read_only {
			return Err(Error::InvalidRequest {
				message: format!("{operation} is disabled because service.read_only is true."),
			});
		}

		Ok(())
	}
}
