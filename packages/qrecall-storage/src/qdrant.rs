use std::{collections::HashMap, time::Duration};

use qdrant_client::{
	Qdrant,
	qdrant::{
		CreateCollectionBuilder, CreateFieldIndexCollection, DeletePointsBuilder, Distance,
		FieldType, GetPointsBuilder, PointStruct, PointsIdsList, Query, QueryPointsBuilder,
		UpdateStatus, UpsertPointsBuilder, Vector, VectorParamsBuilder, Vectors,
		VectorsConfigBuilder,
	},
};

use crate::{
	Error, Result,
	models::{DeleteOutcome, DeleteSelector, NewPoint, ScoredHit, SearchQuery, StoredPoint},
	payload,
};
use qrecall_config::PayloadIndex;

pub struct QdrantStore {
	pub client: Qdrant,
}
impl QdrantStore {
	pub fn new(cfg: &qrecall_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url)
			.api_key(cfg.api_key.clone())
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.build()?;

		Ok(Self { client })
	}

	pub async fn collection_exists(&self, collection: &str) -> Result<bool> {
		Ok(self.client.collection_exists(collection.to_string()).await?)
	}

	pub async fn list_collections(&self) -> Result<Vec<String>> {
		let response = self.client.list_collections().await?;

		Ok(response.collections.into_iter().map(|collection| collection.name).collect())
	}

	pub async fn search(&self, query: SearchQuery<'_>) -> Result<Vec<ScoredHit>> {
		let mut builder = QueryPointsBuilder::new(query.collection)
			.query(Query::new_nearest(query.vector))
			.limit(query.limit)
			.with_payload(true);

		if !query.vector_name.is_empty() {
			builder = builder.using(query.vector_name);
		}
		if let Some(filter) = query.filter {
			builder = builder.filter(filter);
		}

		let response = self.client.query(builder).await?;

		Ok(response
			.result
			.into_iter()
			.map(|point| ScoredHit {
				id: point.id.and_then(payload::point_id_to_string),
				score: point.score,
				payload: payload::to_json_map(point.payload),
			})
			.collect())
	}

	/// Creates the collection and its payload indexes when it does not exist yet.
	///
	/// Returns whether the collection was created by this call.
	pub async fn ensure_collection(
		&self,
		collection: &str,
		vector_name: &str,
		vector_dim: u32,
		indexes: &[PayloadIndex],
	) -> Result<bool> {
		if self.collection_exists(collection).await? {
			return Ok(false);
		}

		let params = VectorParamsBuilder::new(vector_dim.into(), Distance::Cosine);
		let builder = if vector_name.is_empty() {
			CreateCollectionBuilder::new(collection).vectors_config(params)
		} else {
			let mut vectors_config = VectorsConfigBuilder::default();

			vectors_config.add_named_vector_params(vector_name, params);

			CreateCollectionBuilder::new(collection).vectors_config(vectors_config)
		};

		self.client.create_collection(builder).await?;

		for index in indexes {
			let field_type = field_type(&index.schema)?;
			let request = CreateFieldIndexCollection {
				collection_name: collection.to_string(),
				wait: Some(true),
				field_name: index.field.clone(),
				field_type: Some(field_type as i32),
				field_index_params: None,
				ordering: None,
			};

			self.client.create_field_index(request).await?;
		}

		tracing::info!(
			collection = %collection,
			indexes = indexes.len(),
			"Created Qdrant collection."
		);

		Ok(true)
	}

	pub async fn upsert(&self, point: NewPoint<'_>) -> Result<()> {
		let vectors: Vectors = if point.vector_name.is_empty() {
			point.vector.into()
		} else {
			HashMap::from([(point.vector_name.to_string(), Vector::from(point.vector))]).into()
		};
		let id = payload::parse_point_id(&point.id)?;
		let record = PointStruct::new(id, vectors, payload::from_json_map(point.payload));
		let upsert = UpsertPointsBuilder::new(point.collection, vec![record]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	pub async fn retrieve(&self, collection: &str, id: &str) -> Result<Option<StoredPoint>> {
		let point_id = payload::parse_point_id(id)?;
		let request = GetPointsBuilder::new(collection, vec![point_id])
			.with_payload(true)
			.with_vectors(false);
		let response = self.client.get_points(request).await?;

		Ok(response.result.into_iter().next().map(|point| StoredPoint {
			id: point.id.and_then(payload::point_id_to_string),
			payload: payload::to_json_map(point.payload),
		}))
	}

	pub async fn delete(&self, collection: &str, selector: DeleteSelector) -> Result<DeleteOutcome> {
		let builder = DeletePointsBuilder::new(collection).wait(true);
		let builder = match selector {
			DeleteSelector::Ids(ids) => {
				let ids = ids
					.iter()
					.map(|id| payload::parse_point_id(id))
					.collect::<Result<Vec<_>>>()?;

				builder.points(PointsIdsList { ids })
			},
			DeleteSelector::Filter(filter) => builder.points(filter),
		};
		let response = self.client.delete_points(builder).await?;
		let Some(result) = response.result else {
			return Ok(DeleteOutcome { status: "unknown".to_string(), operation_id: None });
		};
		let status = match UpdateStatus::try_from(result.status) {
			Ok(UpdateStatus::Completed) => "completed",
			Ok(UpdateStatus::Acknowledged) => "acknowledged",
			_ => "unknown",
		};

		Ok(DeleteOutcome { status: status.to_string(), operation_id: result.operation_id })
	}
}

fn field_type(schema: &str) -> Result<FieldType> {
	match schema {
		"keyword" => Ok(FieldType::Keyword),
		"integer" => Ok(FieldType::Integer),
		"float" => Ok(FieldType::Float),
		"bool" => Ok(FieldType::Bool),
		"text" => Ok(FieldType::Text),
		"datetime" => Ok(FieldType::Datetime),
		"uuid" => Ok(FieldType::Uuid),
		other => Err(Error::InvalidArgument(format!("Unsupported payload index schema {other}."))),
	}
}
