pub mod delete;
pub mod fanout;
pub mod field_filter;
pub mod filter;
pub mod format;
pub mod merge;
pub mod rerank;
pub mod resolve;
pub mod retrieve;
pub mod search;
pub mod store;

mod error;

pub use delete::{DeleteRequest, DeleteResponse};
pub use error::{Error, Result};
pub use fanout::SearchOutcome;
pub use format::ResponseMode;
pub use merge::{CollectionFailure, Merged, RankedPool};
pub use rerank::Reranked;
pub use retrieve::{RetrieveRequest, RetrieveResponse};
pub use search::{FindRequest, FindResponse};
pub use store::{StoreRequest, StoreResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use serde::Serialize;
use serde_json::{Map, Value};

use qrecall_config::{Config, EmbeddingProviderConfig, PayloadIndex, RerankProviderConfig};
use qrecall_providers::{embedding, rerank as rerank_provider};
use qrecall_storage::{
	Result as StorageResult,
	models::{DeleteOutcome, DeleteSelector, NewPoint, ScoredHit, SearchQuery, StoredPoint},
	qdrant::QdrantStore,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Payload keys that may hold an entry's text, in lookup order.
pub const CONTENT_FIELDS: [&str; 2] = ["page_content", "document"];
pub const METADATA_FIELD: &str = "metadata";
/// Payload key written by [`RecallService::store`].
pub const DOCUMENT_FIELD: &str = "document";

/// One retrieved item.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entry {
	pub content: String,
	pub metadata: Option<Map<String, Value>>,
	pub id: Option<String>,
	pub score: Option<f32>,
}
impl Entry {
	pub fn from_payload(
		id: Option<String>,
		score: Option<f32>,
		mut payload: Map<String, Value>,
	) -> Self {
		let content = CONTENT_FIELDS
			.iter()
			.find_map(|field| {
				payload.get(*field).and_then(Value::as_str).filter(|text| !text.is_empty())
			})
			.unwrap_or_default()
			.to_string();
		let metadata = match payload.remove(METADATA_FIELD) {
			Some(Value::Object(map)) => Some(map),
			_ => None,
		};

		Self { content, metadata, id, score }
	}

	pub fn metadata_str(&self, key: &str) -> Option<&str> {
		self.metadata.as_ref()?.get(key)?.as_str()
	}

	pub fn collection(&self) -> Option<&str> {
		self.metadata_str("collection")
	}
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	/// Returns one score per document, aligned with `docs`.
	fn rerank<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
		top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Option<f32>>>>;
}

/// The slice of Qdrant the service depends on.
pub trait VectorStore
where
	Self: Send + Sync,
{
	fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, StorageResult<bool>>;

	fn list_collections(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

	fn search<'a>(&'a self, query: SearchQuery<'a>) -> BoxFuture<'a, StorageResult<Vec<ScoredHit>>>;

	fn ensure_collection<'a>(
		&'a self,
		collection: &'a str,
		vector_name: &'a str,
		vector_dim: u32,
		indexes: &'a [PayloadIndex],
	) -> BoxFuture<'a, StorageResult<bool>>;

	fn upsert<'a>(&'a self, point: NewPoint<'a>) -> BoxFuture<'a, StorageResult<()>>;

	fn retrieve<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, StorageResult<Option<StoredPoint>>>;

	fn delete<'a>(
		&'a self,
		collection: &'a str,
		selector: DeleteSelector,
	) -> BoxFuture<'a, StorageResult<DeleteOutcome>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, rerank: Arc<dyn RerankProvider>) -> Self {
		Self { embedding, rerank }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), rerank: provider }
	}
}

pub struct RecallService {
	pub cfg: Config,
	pub store: Arc<dyn VectorStore>,
	pub providers: Providers,
}
impl RecallService {
	pub fn new(cfg: Config, store: Arc<dyn VectorStore>) -> Self {
		Self { cfg, store, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, store: Arc<dyn VectorStore>, providers: Providers) -> Self {
		Self { cfg, store, providers }
	}

	/// Embeds a single text with the configured provider.
	pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [text.to_string()];
		let vector = self
			.providers
			.embedding
			.embed(cfg, &texts)
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			})?;

		if vector.len() != cfg.dimensions as usize {
			return Err(Error::Provider {
				message: format!(
					"Embedding dimension mismatch: expected {}, got {}.",
					cfg.dimensions,
					vector.len()
				),
			});
		}

		Ok(vector)
	}

	/// Resolves the single collection targeted by store, retrieve, and delete.
	pub(crate) fn target_collection(&self, requested: Option<&str>) -> Result<String> {
		if let Some(name) = requested {
			if name.trim().is_empty() {
				return Err(Error::InvalidRequest {
					message: "collection_name must be non-empty.".to_string(),
				});
			}

			return Ok(name.to_string());
		}

		self.cfg.storage.qdrant.default_collection.clone().ok_or_else(|| Error::InvalidRequest {
			message: "collection_name is required when no default collection is configured."
				.to_string(),
		})
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}
impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
		top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Option<f32>>>> {
		Box::pin(rerank_provider::rerank(cfg, query, docs, top_k))
	}
}

impl VectorStore for QdrantStore {
	fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(QdrantStore::collection_exists(self, collection))
	}

	fn list_collections(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
		Box::pin(QdrantStore::list_collections(self))
	}

	fn search<'a>(&'a self, query: SearchQuery<'a>) -> BoxFuture<'a, StorageResult<Vec<ScoredHit>>> {
		Box::pin(QdrantStore::search(self, query))
	}

	fn ensure_collection<'a>(
		&'a self,
		collection: &'a str,
		vector_name: &'a str,
		vector_dim: u32,
		indexes: &'a [PayloadIndex],
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(QdrantStore::ensure_collection(self, collection, vector_name, vector_dim, indexes))
	}

	fn upsert<'a>(&'a self, point: NewPoint<'a>) -> BoxFuture<'a, StorageResult<()>> {
		Box::pin(QdrantStore::upsert(self, point))
	}

	fn retrieve<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, StorageResult<Option<StoredPoint>>> {
		Box::pin(QdrantStore::retrieve(self, collection, id))
	}

	fn delete<'a>(
		&'a self,
		collection: &'a str,
		selector: DeleteSelector,
	) -> BoxFuture<'a, StorageResult<DeleteOutcome>> {
		Box::pin(QdrantStore::delete(self, collection, selector))
	}
}
