use std::{
	collections::{BTreeMap, HashSet},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;
use serde_json::{Map, Value};
use tokio::time::{self, Instant};

use qdrant_client::qdrant::{Condition, Filter, condition::ConditionOneOf};
use qrecall_config::{
	Config, EmbeddingProviderConfig, FieldType, FilterCondition, FilterableField, PayloadIndex,
	PriorityStrategy, Providers as ProviderConfigs, Qdrant, RerankProviderConfig, Search, Service,
	Storage, Tools, Transport,
};
use qrecall_service::{
	BoxFuture, DeleteRequest, EmbeddingProvider, Error, FindRequest, Providers, RecallService,
	RerankProvider, ResponseMode, RetrieveRequest, SearchOutcome, StoreRequest, VectorStore,
};
use qrecall_storage::{
	Error as StorageError, Result as StorageResult,
	models::{DeleteOutcome, DeleteSelector, NewPoint, ScoredHit, SearchQuery, StoredPoint},
};

const DIM: u32 = 4;

struct SpyEmbedding {
	calls: Arc<AtomicUsize>,
}
impl EmbeddingProvider for SpyEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vector = vec![0.5; cfg.dimensions as usize];

		Box::pin(async move { Ok(vec![vector; texts.len()]) })
	}
}

struct FailingEmbedding;
impl EmbeddingProvider for FailingEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Err(eyre::eyre!("embedding gateway unavailable")) })
	}
}

/// Returns fixed scores, or fails with the given message.
struct ScriptedRerank {
	scores: Result<Vec<Option<f32>>, String>,
	calls: Arc<AtomicUsize>,
}
impl RerankProvider for ScriptedRerank {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a RerankProviderConfig,
		_query: &'a str,
		_docs: &'a [String],
		_top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Option<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let scores = self.scores.clone();

		Box::pin(async move { scores.map_err(|message| eyre::eyre!(message)) })
	}
}

struct FakePoint {
	id: String,
	score: f32,
	payload: Map<String, Value>,
}

#[derive(Default)]
struct FakeStore {
	collections: Mutex<BTreeMap<String, Vec<FakePoint>>>,
	failing: HashSet<String>,
	searches: AtomicUsize,
	filtered_searches: AtomicUsize,
	last_filter: Mutex<Option<Filter>>,
	created_indexes: Mutex<Vec<String>>,
	filter_deletes: AtomicUsize,
}
impl FakeStore {
	fn with_collection(self, name: &str, hits: &[(&str, f32, &str)]) -> Self {
		let points = hits
			.iter()
			.map(|(id, score, text)| FakePoint {
				id: id.to_string(),
				score: *score,
				payload: object(serde_json::json!({ "document": text, "metadata": { "source": name } })),
			})
			.collect();

		self.collections.lock().expect("lock").insert(name.to_string(), points);

		self
	}

	fn failing(mut self, name: &str) -> Self {
		self.failing.insert(name.to_string());

		self.with_collection(name, &[])
	}

	fn point_count(&self, collection: &str) -> usize {
		self.collections.lock().expect("lock").get(collection).map_or(0, Vec::len)
	}
}
impl VectorStore for FakeStore {
	fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
		let exists = self.collections.lock().expect("lock").contains_key(collection);

		Box::pin(async move { Ok(exists) })
	}

	fn list_collections(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
		let names = self.collections.lock().expect("lock").keys().cloned().collect();

		Box::pin(async move { Ok(names) })
	}

	fn search<'a>(&'a self, query: SearchQuery<'a>) -> BoxFuture<'a, StorageResult<Vec<ScoredHit>>> {
		self.searches.fetch_add(1, Ordering::SeqCst);

		if query.filter.is_some() {
			self.filtered_searches.fetch_add(1, Ordering::SeqCst);
		}

		*self.last_filter.lock().expect("lock") = query.filter.clone();

		let result = if self.failing.contains(query.collection) {
			Err(StorageError::InvalidArgument("connection reset by peer".to_string()))
		} else {
			let guard = self.collections.lock().expect("lock");
			let mut hits: Vec<ScoredHit> = guard
				.get(query.collection)
				.into_iter()
				.flatten()
				.map(|point| ScoredHit {
					id: Some(point.id.clone()),
					score: point.score,
					payload: point.payload.clone(),
				})
				.collect();

			hits.sort_by(|a, b| b.score.total_cmp(&a.score));
			hits.truncate(query.limit as usize);

			Ok(hits)
		};

		Box::pin(async move { result })
	}

	fn ensure_collection<'a>(
		&'a self,
		collection: &'a str,
		_vector_name: &'a str,
		_vector_dim: u32,
		indexes: &'a [PayloadIndex],
	) -> BoxFuture<'a, StorageResult<bool>> {
		let mut guard = self.collections.lock().expect("lock");
		let created = !guard.contains_key(collection);

		guard.entry(collection.to_string()).or_default();

		if created {
			self.created_indexes
				.lock()
				.expect("lock")
				.extend(indexes.iter().map(|index| format!("{}:{}", index.field, index.schema)));
		}

		Box::pin(async move { Ok(created) })
	}

	fn upsert<'a>(&'a self, point: NewPoint<'a>) -> BoxFuture<'a, StorageResult<()>> {
		self.collections
			.lock()
			.expect("lock")
			.entry(point.collection.to_string())
			.or_default()
			.push(FakePoint { id: point.id, score: 1.0, payload: point.payload });

		Box::pin(async move { Ok(()) })
	}

	fn retrieve<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, StorageResult<Option<StoredPoint>>> {
		let found = self.collections.lock().expect("lock").get(collection).and_then(|points| {
			points
				.iter()
				.find(|point| point.id == id)
				.map(|point| StoredPoint { id: Some(point.id.clone()), payload: point.payload.clone() })
		});

		Box::pin(async move { Ok(found) })
	}

	fn delete<'a>(
		&'a self,
		collection: &'a str,
		selector: DeleteSelector,
	) -> BoxFuture<'a, StorageResult<DeleteOutcome>> {
		let mut guard = self.collections.lock().expect("lock");

		match (guard.get_mut(collection), &selector) {
			(Some(points), DeleteSelector::Ids(ids)) =>
				points.retain(|point| !ids.contains(&point.id)),
			(_, DeleteSelector::Filter(_)) => {
				self.filter_deletes.fetch_add(1, Ordering::SeqCst);
			},
			_ => {},
		}

		Box::pin(async move {
			Ok(DeleteOutcome { status: "completed".to_string(), operation_id: Some(7) })
		})
	}
}

/// Every collection exists; each search sleeps for its configured delay, then answers or fails.
struct DelayedStore {
	delays: Vec<(String, Duration, bool)>,
}
impl DelayedStore {
	fn branch(&self, collection: &str) -> (Duration, bool) {
		self.delays
			.iter()
			.find(|(name, _, _)| name == collection)
			.map(|(_, delay, fails)| (*delay, *fails))
			.unwrap_or_default()
	}
}
impl VectorStore for DelayedStore {
	fn collection_exists<'a>(&'a self, _collection: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(async move { Ok(true) })
	}

	fn list_collections(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
		let names = self.delays.iter().map(|(name, _, _)| name.clone()).collect();

		Box::pin(async move { Ok(names) })
	}

	fn search<'a>(&'a self, query: SearchQuery<'a>) -> BoxFuture<'a, StorageResult<Vec<ScoredHit>>> {
		let (delay, fails) = self.branch(query.collection);
		let collection = query.collection.to_string();

		Box::pin(async move {
			time::sleep(delay).await;

			if fails {
				return Err(StorageError::InvalidArgument(format!("{collection} timed out")));
			}

			Ok(vec![ScoredHit {
				id: Some(format!("{collection}-1")),
				score: 0.5,
				payload: object(serde_json::json!({ "document": collection })),
			}])
		})
	}

	fn ensure_collection<'a>(
		&'a self,
		_collection: &'a str,
		_vector_name: &'a str,
		_vector_dim: u32,
		_indexes: &'a [PayloadIndex],
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(async move { Ok(false) })
	}

	fn upsert<'a>(&'a self, _point: NewPoint<'a>) -> BoxFuture<'a, StorageResult<()>> {
		Box::pin(async move { Ok(()) })
	}

	fn retrieve<'a>(
		&'a self,
		_collection: &'a str,
		_id: &'a str,
	) -> BoxFuture<'a, StorageResult<Option<StoredPoint>>> {
		Box::pin(async move { Ok(None) })
	}

	fn delete<'a>(
		&'a self,
		_collection: &'a str,
		_selector: DeleteSelector,
	) -> BoxFuture<'a, StorageResult<DeleteOutcome>> {
		Box::pin(async move {
			Ok(DeleteOutcome { status: "completed".to_string(), operation_id: None })
		})
	}
}

struct Harness {
	service: RecallService,
	store: Arc<FakeStore>,
	embed_calls: Arc<AtomicUsize>,
	rerank_calls: Arc<AtomicUsize>,
}
impl Harness {
	fn new(cfg: Config, store: FakeStore) -> Self {
		Self::with_rerank(cfg, store, Ok(Vec::new()))
	}

	fn with_rerank(cfg: Config, store: FakeStore, scores: Result<Vec<Option<f32>>, String>) -> Self {
		let store = Arc::new(store);
		let embed_calls = Arc::new(AtomicUsize::new(0));
		let rerank_calls = Arc::new(AtomicUsize::new(0));
		let providers = Providers::new(
			Arc::new(SpyEmbedding { calls: embed_calls.clone() }),
			Arc::new(ScriptedRerank { scores, calls: rerank_calls.clone() }),
		);
		let service = RecallService::with_providers(cfg, store.clone(), providers);

		Self { service, store, embed_calls, rerank_calls }
	}

	fn embeds(&self) -> usize {
		self.embed_calls.load(Ordering::SeqCst)
	}
}

fn object(value: Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => map,
		other => panic!("expected object, got {other}"),
	}
}

fn names(values: &[&str]) -> Vec<String> {
	values.iter().map(|value| value.to_string()).collect()
}

fn test_config() -> Config {
	Config {
		service: Service {
			mcp_bind: "127.0.0.1:8000".to_string(),
			transport: Transport::StreamableHttp,
			log_level: "info".to_string(),
			read_only: false,
		},
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				api_key: None,
				timeout_ms: 1_000,
				default_collection: Some("memories".to_string()),
				vector_dim: DIM,
				payload_indexes: Vec::new(),
				filterable_fields: Vec::new(),
			},
		},
		providers: ProviderConfigs {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "test".to_string(),
				dimensions: DIM,
				vector_name: String::new(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			rerank: RerankProviderConfig {
				enabled: true,
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				..RerankProviderConfig::default()
			},
		},
		search: Search::default(),
		tools: Tools::default(),
	}
}

fn find(query: &str) -> FindRequest {
	FindRequest { query: query.to_string(), ..FindRequest::default() }
}

fn ids(response: &qrecall_service::FindResponse) -> Vec<&str> {
	response.entries.iter().filter_map(|entry| entry.id.as_deref()).collect()
}

#[tokio::test]
async fn find_embeds_once_and_merges_across_collections() {
	let store = FakeStore::default()
		.with_collection("a", &[("a1", 0.9, "alpha"), ("a2", 0.2, "alpha two")])
		.with_collection("b", &[("b1", 0.5, "beta")])
		.with_collection("c", &[("c1", 0.7, "gamma")]);
	let harness = Harness::new(test_config(), store);
	let response = harness
		.service
		.find(FindRequest { collections: Some(names(&["a", "b", "c"])), ..find("what") })
		.await
		.expect("find");

	assert_eq!(harness.embeds(), 1);
	assert_eq!(harness.store.searches.load(Ordering::SeqCst), 3);
	assert_eq!(ids(&response), vec!["a1", "c1", "b1", "a2"]);
	assert_eq!(response.entries[1].collection(), Some("c"));
	assert_eq!(response.lines.len(), response.entries.len());
	assert_eq!(response.mode, ResponseMode::Minimal);
	assert!(response.failures.is_empty());
}

#[tokio::test]
async fn failing_collection_is_reported_without_affecting_siblings() {
	let store =
		FakeStore::default().failing("a").with_collection("b", &[("b1", 0.4, "beta")]);
	let harness = Harness::new(test_config(), store);
	let response = harness
		.service
		.find(FindRequest { collections: Some(names(&["a", "b"])), ..find("what") })
		.await
		.expect("partial failure is not fatal");

	assert_eq!(ids(&response), vec!["b1"]);
	assert_eq!(response.failures.len(), 1);
	assert_eq!(response.failures[0].collection, "a");
	assert!(response.failures[0].message.contains("connection reset"));
}

#[tokio::test]
async fn missing_collection_yields_no_hits_and_no_failure() {
	let store = FakeStore::default().with_collection("b", &[("b1", 0.4, "beta")]);
	let harness = Harness::new(test_config(), store);
	let response = harness
		.service
		.find(FindRequest { collections: Some(names(&["ghost", "b"])), ..find("what") })
		.await
		.expect("find");

	assert_eq!(ids(&response), vec!["b1"]);
	assert!(response.failures.is_empty());
}

#[tokio::test]
async fn wildcard_searches_every_known_collection() {
	let store = FakeStore::default()
		.with_collection("a", &[("a1", 0.3, "alpha")])
		.with_collection("b", &[("b1", 0.6, "beta")]);
	let harness = Harness::new(test_config(), store);
	let response = harness
		.service
		.find(FindRequest { collections: Some(names(&["*"])), ..find("what") })
		.await
		.expect("find");
	let mut searched = response.collections.clone();

	searched.sort();

	assert_eq!(searched, names(&["a", "b"]));
	assert_eq!(ids(&response), vec!["b1", "a1"]);
}

#[tokio::test]
async fn default_collection_applies_without_selectors() {
	let store = FakeStore::default()
		.with_collection("memories", &[("m1", 0.3, "memory")])
		.with_collection("other", &[("o1", 0.9, "other")]);
	let harness = Harness::new(test_config(), store);
	let response = harness.service.find(find("what")).await.expect("find");

	assert_eq!(response.collections, names(&["memories"]));
	assert_eq!(ids(&response), vec!["m1"]);
}

#[tokio::test]
async fn single_collection_budget_is_the_limit() {
	let hits = [("1", 0.9, "a"), ("2", 0.8, "b"), ("3", 0.7, "c"), ("4", 0.6, "d")];
	let store = FakeStore::default().with_collection("a", &hits).with_collection("b", &hits);
	let harness = Harness::new(test_config(), store);
	let single = harness
		.service
		.find(FindRequest { collection_name: Some("a".to_string()), limit: Some(2), ..find("q") })
		.await
		.expect("find");
	let multi = harness
		.service
		.find(FindRequest { collections: Some(names(&["a", "b"])), limit: Some(2), ..find("q") })
		.await
		.expect("find");

	assert_eq!(single.entries.len(), 2);
	assert_eq!(multi.entries.len(), 4);
}

#[tokio::test]
async fn non_positive_limit_returns_nothing_without_embedding() {
	let store = FakeStore::default().with_collection("memories", &[("m1", 0.3, "memory")]);
	let harness = Harness::new(test_config(), store);
	let response =
		harness.service.find(FindRequest { limit: Some(0), ..find("what") }).await.expect("find");

	assert!(response.entries.is_empty());
	assert_eq!(harness.embeds(), 0);
}

#[tokio::test]
async fn invalid_requests_fail_before_any_io() {
	let store = FakeStore::default().with_collection("memories", &[("m1", 0.3, "memory")]);
	let harness = Harness::new(test_config(), store);
	let bad_mode = harness
		.service
		.find(FindRequest { mode: Some("verbose".to_string()), ..find("what") })
		.await;
	let blank_query = harness.service.find(find("  ")).await;

	assert!(matches!(bad_mode, Err(Error::InvalidRequest { .. })));
	assert!(matches!(blank_query, Err(Error::InvalidRequest { .. })));
	assert_eq!(harness.embeds(), 0);
	assert_eq!(harness.store.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blank_collection_names_search_as_missing_collections() {
	let store = FakeStore::default().with_collection("memories", &[("m1", 0.3, "memory")]);
	let harness = Harness::new(test_config(), store);
	let response = harness
		.service
		.find(FindRequest { collections: Some(names(&["memories", " "])), ..find("what") })
		.await
		.expect("blank names are not a request error");

	assert_eq!(response.collections, names(&["memories", " "]));
	assert_eq!(ids(&response), vec!["m1"]);
	assert!(response.failures.is_empty());
}

#[tokio::test]
async fn no_selector_and_no_default_is_invalid() {
	let mut cfg = test_config();

	cfg.storage.qdrant.default_collection = None;

	let harness = Harness::new(cfg, FakeStore::default());
	let err = harness.service.find(find("what")).await.expect_err("no collection");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(harness.embeds(), 0);
}

#[tokio::test]
async fn query_filter_requires_opt_in_and_reaches_every_search() {
	let filter = serde_json::json!({
		"must": [{ "key": "metadata.source", "match": { "value": "a" } }]
	});
	let store = FakeStore::default()
		.with_collection("a", &[("a1", 0.3, "alpha")])
		.with_collection("b", &[("b1", 0.6, "beta")]);
	let harness = Harness::new(test_config(), store);
	let err = harness
		.service
		.find(FindRequest { query_filter: Some(filter.clone()), ..find("what") })
		.await
		.expect_err("filters are off by default");

	assert!(err.to_string().contains("allow_arbitrary_filter"));

	let mut cfg = test_config();

	cfg.search.allow_arbitrary_filter = true;

	let store = FakeStore::default()
		.with_collection("a", &[("a1", 0.3, "alpha")])
		.with_collection("b", &[("b1", 0.6, "beta")]);
	let harness = Harness::new(cfg, store);

	harness
		.service
		.find(FindRequest {
			collections: Some(names(&["a", "b"])),
			query_filter: Some(filter),
			..find("what")
		})
		.await
		.expect("find");

	assert_eq!(harness.store.filtered_searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn hard_priority_reorders_collections() {
	let mut cfg = test_config();

	cfg.search.priority_strategy = PriorityStrategy::Hard;
	cfg.search.priority_order = names(&["y", "x"]);

	let store = FakeStore::default()
		.with_collection("x", &[("x1", 0.75, "x")])
		.with_collection("y", &[("y1", 0.6, "y")])
		.with_collection("z", &[("z1", 0.95, "z")]);
	let harness = Harness::new(cfg, store);
	let response = harness
		.service
		.find(FindRequest { collections: Some(names(&["x", "y", "z"])), ..find("q") })
		.await
		.expect("find");

	assert_eq!(ids(&response), vec!["y1", "x1", "z1"]);
}

#[tokio::test]
async fn rerank_reorders_and_truncates_the_merged_pool() {
	let store = FakeStore::default()
		.with_collection("a", &[("a1", 0.9, "alpha")])
		.with_collection("b", &[("b1", 0.5, "beta")])
		.with_collection("c", &[("c1", 0.1, "gamma")]);
	let harness = Harness::with_rerank(
		test_config(),
		store,
		Ok(vec![Some(0.2), Some(0.8), None]),
	);
	let response = harness
		.service
		.find(FindRequest {
			collections: Some(names(&["a", "b", "c"])),
			limit: Some(1),
			rerank: true,
			..find("q")
		})
		.await
		.expect("find");

	assert_eq!(harness.rerank_calls.load(Ordering::SeqCst), 1);
	assert_eq!(ids(&response), vec!["b1"]);
	assert_eq!(response.entries[0].score, Some(0.8));
	assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn rerank_failure_degrades_to_the_merged_pool() {
	let store = FakeStore::default()
		.with_collection("a", &[("a1", 0.9, "alpha")])
		.with_collection("b", &[("b1", 0.5, "beta")]);
	let harness = Harness::with_rerank(test_config(), store, Err("reranker timed out".to_string()));
	let response = harness
		.service
		.find(FindRequest { collections: Some(names(&["a", "b"])), rerank: true, ..find("q") })
		.await
		.expect("rerank failure is not fatal");

	assert_eq!(ids(&response), vec!["a1", "b1"]);
	assert_eq!(response.warnings.len(), 1);
	assert!(response.warnings[0].contains("reranker timed out"));
}

#[tokio::test]
async fn rerank_is_skipped_with_a_warning_when_disabled() {
	let mut cfg = test_config();

	cfg.providers.rerank.enabled = false;

	let store = FakeStore::default().with_collection("memories", &[("m1", 0.3, "memory")]);
	let harness = Harness::new(cfg, store);
	let response =
		harness.service.find(FindRequest { rerank: true, ..find("q") }).await.expect("find");

	assert_eq!(ids(&response), vec!["m1"]);
	assert_eq!(harness.rerank_calls.load(Ordering::SeqCst), 0);
	assert_eq!(response.warnings.len(), 1);
}

#[tokio::test]
async fn store_then_retrieve_and_delete() {
	let harness = Harness::new(test_config(), FakeStore::default());
	let stored = harness
		.service
		.store(StoreRequest {
			information: "the cache lives on port 6379".to_string(),
			collection_name: Some("notes".to_string()),
			metadata: Some(object(serde_json::json!({ "ports": [6379] }))),
		})
		.await
		.expect("store");

	assert!(stored.created_collection);
	assert_eq!(stored.collection, "notes");
	assert_eq!(harness.embeds(), 1);

	let retrieved = harness
		.service
		.retrieve(RetrieveRequest {
			point_id: stored.point_id.clone(),
			collection_name: Some("notes".to_string()),
		})
		.await
		.expect("retrieve");
	let entry = retrieved.entry.expect("stored point");

	assert_eq!(entry.content, "the cache lives on port 6379");
	assert_eq!(entry.metadata.as_ref().and_then(|m| m.get("ports")), Some(&serde_json::json!([6379])));
	assert_eq!(harness.embeds(), 1);

	let deleted = harness
		.service
		.delete(DeleteRequest {
			collection_name: Some("notes".to_string()),
			point_ids: Some(vec![stored.point_id]),
			query_filter: None,
				..DeleteRequest::default()
		})
		.await
		.expect("delete");

	assert_eq!(deleted.status, "completed");
	assert_eq!(deleted.operation_id, Some(7));
	assert_eq!(harness.store.point_count("notes"), 0);
}

#[tokio::test]
async fn retrieve_from_missing_collection_finds_nothing() {
	let harness = Harness::new(test_config(), FakeStore::default());
	let response = harness
		.service
		.retrieve(RetrieveRequest { point_id: "42".to_string(), collection_name: None })
		.await
		.expect("retrieve");

	assert_eq!(response.collection, "memories");
	assert!(response.entry.is_none());
}

#[tokio::test]
async fn delete_requires_exactly_one_selector() {
	let mut cfg = test_config();

	cfg.search.allow_arbitrary_filter = true;

	let harness = Harness::new(cfg, FakeStore::default().with_collection("memories", &[]));
	let neither = harness.service.delete(DeleteRequest::default()).await;
	let both = harness
		.service
		.delete(DeleteRequest {
			collection_name: None,
			point_ids: Some(vec!["1".to_string()]),
			query_filter: Some(serde_json::json!({ "must": [{ "has_id": [1] }] })),
				..DeleteRequest::default()
		})
		.await;
	let empty = harness
		.service
		.delete(DeleteRequest { point_ids: Some(Vec::new()), ..DeleteRequest::default() })
		.await;

	assert!(matches!(neither, Err(Error::InvalidRequest { .. })));
	assert!(matches!(both, Err(Error::InvalidRequest { .. })));
	assert!(matches!(empty, Err(Error::InvalidRequest { .. })));
}

#[tokio::test]
async fn delete_from_missing_collection_deletes_nothing() {
	let harness = Harness::new(test_config(), FakeStore::default());
	let response = harness
		.service
		.delete(DeleteRequest {
			collection_name: Some("ghost".to_string()),
			point_ids: Some(vec!["1".to_string()]),
			query_filter: None,
				..DeleteRequest::default()
		})
		.await
		.expect("delete");

	assert_eq!(response.status, "deleted_nothing");
	assert_eq!(response.operation_id, None);
}

#[tokio::test]
async fn read_only_rejects_writes_but_allows_reads() {
	let mut cfg = test_config();

	cfg.service.read_only = true;

	let store = FakeStore::default().with_collection("memories", &[("m1", 0.3, "memory")]);
	let harness = Harness::new(cfg, store);
	let stored = harness
		.service
		.store(StoreRequest { information: "x".to_string(), ..StoreRequest::default() })
		.await;
	let deleted = harness
		.service
		.delete(DeleteRequest { point_ids: Some(vec!["m1".to_string()]), ..DeleteRequest::default() })
		.await;

	assert!(matches!(stored, Err(Error::InvalidRequest { .. })));
	assert!(matches!(deleted, Err(Error::InvalidRequest { .. })));
	assert_eq!(harness.store.point_count("memories"), 1);
	assert!(harness.service.find(find("q")).await.is_ok());
}

#[tokio::test]
async fn fan_out_overlaps_searches_and_keeps_input_order() {
	let delays = vec![
		("c300".to_string(), Duration::from_millis(300), false),
		("c50".to_string(), Duration::from_millis(50), true),
		("c100".to_string(), Duration::from_millis(100), false),
	];
	let collections: Vec<String> = delays.iter().map(|(name, _, _)| name.clone()).collect();
	let embed_calls = Arc::new(AtomicUsize::new(0));
	let providers = Providers::new(
		Arc::new(SpyEmbedding { calls: embed_calls.clone() }),
		Arc::new(ScriptedRerank { scores: Ok(Vec::new()), calls: Arc::new(AtomicUsize::new(0)) }),
	);
	let service =
		RecallService::with_providers(test_config(), Arc::new(DelayedStore { delays }), providers);
	let started = Instant::now();
	let outcomes = service.search_all("q", &collections, 5, None).await.expect("search_all");
	let elapsed = started.elapsed();
	let order: Vec<(&str, bool)> = outcomes
		.iter()
		.map(|outcome| (outcome.collection(), matches!(outcome, SearchOutcome::Failed { .. })))
		.collect();

	assert_eq!(order, vec![("c300", false), ("c50", true), ("c100", false)]);
	assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
	assert!(elapsed < Duration::from_millis(440), "searches ran sequentially: {elapsed:?}");
	assert_eq!(embed_calls.load(Ordering::SeqCst), 1);

	match &outcomes[2] {
		SearchOutcome::Hits { entries, .. } =>
			assert_eq!(entries[0].id.as_deref(), Some("c100-1")),
		other => panic!("expected hits for c100, got {other:?}"),
	}
}

#[tokio::test]
async fn every_collection_failing_is_still_not_fatal() {
	let store = FakeStore::default().failing("a").failing("b");
	let harness = Harness::new(test_config(), store);
	let response = harness
		.service
		.find(FindRequest { collections: Some(names(&["a", "b"])), ..find("what") })
		.await
		.expect("collection failures are not fatal");

	assert!(response.entries.is_empty());
	assert!(response.lines.is_empty());
	assert_eq!(
		response.failures.iter().map(|failure| failure.collection.as_str()).collect::<Vec<_>>(),
		vec!["a", "b"]
	);
}

#[tokio::test]
async fn embedding_failure_fails_the_request_before_searching() {
	let store = Arc::new(
		FakeStore::default()
			.with_collection("a", &[("a1", 0.3, "alpha")])
			.with_collection("b", &[("b1", 0.6, "beta")]),
	);
	let providers = Providers::new(
		Arc::new(FailingEmbedding),
		Arc::new(ScriptedRerank { scores: Ok(Vec::new()), calls: Arc::new(AtomicUsize::new(0)) }),
	);
	let service = RecallService::with_providers(test_config(), store.clone(), providers);
	let err = service
		.find(FindRequest { collections: Some(names(&["a", "b"])), ..find("what") })
		.await
		.expect_err("embedding failure is fatal");

	assert!(matches!(err, Error::Provider { .. }), "{err}");
	assert!(err.to_string().contains("embedding gateway unavailable"), "{err}");
	assert_eq!(store.searches.load(Ordering::SeqCst), 0);
}

fn filterable(
	name: &str,
	field_type: FieldType,
	condition: Option<FilterCondition>,
) -> FilterableField {
	FilterableField {
		name: name.to_string(),
		description: format!("{name} filter"),
		field_type,
		condition,
		required: false,
	}
}

fn filterable_config() -> Config {
	let mut cfg = test_config();

	cfg.search.allow_arbitrary_filter = true;
	cfg.storage.qdrant.filterable_fields = vec![
		filterable("doc_type", FieldType::Keyword, Some(FilterCondition::Eq)),
		filterable("year", FieldType::Integer, Some(FilterCondition::Gte)),
		filterable("draft", FieldType::Boolean, None),
	];

	cfg
}

fn condition_key(condition: &Condition) -> &str {
	match condition.condition_one_of.as_ref() {
		Some(ConditionOneOf::Field(field)) => field.key.as_str(),
		other => panic!("expected field condition, got {other:?}"),
	}
}

#[tokio::test]
async fn typed_filter_arguments_reach_the_search() {
	let store = FakeStore::default().with_collection("memories", &[("m1", 0.4, "kept")]);
	let harness = Harness::new(filterable_config(), store);
	let arguments = serde_json::json!({ "doc_type": "runbook", "year": 2020 });

	harness
		.service
		.find(FindRequest { filter_arguments: object(arguments), ..find("what") })
		.await
		.expect("find");

	let filter = harness.store.last_filter.lock().expect("lock").clone().expect("filter");
	let keys: Vec<&str> = filter.must.iter().map(condition_key).collect();

	assert_eq!(keys, vec!["metadata.doc_type", "metadata.year"]);
	assert!(filter.must_not.is_empty());

	harness.service.find(find("what")).await.expect("find without arguments");

	assert!(harness.store.last_filter.lock().expect("lock").is_none());
}

#[tokio::test]
async fn typed_filter_arguments_take_precedence_over_query_filter() {
	let store = FakeStore::default().with_collection("memories", &[("m1", 0.4, "kept")]);
	let harness = Harness::new(filterable_config(), store);
	let err = harness
		.service
		.find(FindRequest {
			query_filter: Some(serde_json::json!({ "must": [] })),
			..find("what")
		})
		.await
		.expect_err("query_filter is refused");

	assert!(err.to_string().contains("filterable_fields"), "{err}");

	for arguments in [
		serde_json::json!({ "draft": true }),
		serde_json::json!({ "colour": "red" }),
		serde_json::json!({ "year": "recent" }),
	] {
		let err = harness
			.service
			.find(FindRequest { filter_arguments: object(arguments), ..find("what") })
			.await
			.expect_err("invalid argument");

		assert!(matches!(err, Error::InvalidRequest { .. }), "{err}");
	}

	assert_eq!(harness.embeds(), 0);
}

#[tokio::test]
async fn typed_filter_arguments_select_points_to_delete() {
	let store = FakeStore::default().with_collection("memories", &[("m1", 0.4, "kept")]);
	let harness = Harness::new(filterable_config(), store);
	let response = harness
		.service
		.delete(DeleteRequest {
			filter_arguments: object(serde_json::json!({ "doc_type": "draft" })),
			..DeleteRequest::default()
		})
		.await
		.expect("delete");

	assert_eq!(response.status, "completed");
	assert_eq!(harness.store.filter_deletes.load(Ordering::SeqCst), 1);

	let err = harness
		.service
		.delete(DeleteRequest::default())
		.await
		.expect_err("a selector is required");

	assert!(matches!(err, Error::InvalidRequest { .. }), "{err}");
}

#[tokio::test]
async fn created_collections_index_filterable_fields() {
	let harness = Harness::new(filterable_config(), FakeStore::default());

	harness
		.service
		.store(StoreRequest {
			information: "note".to_string(),
			collection_name: Some("notes".to_string()),
			..StoreRequest::default()
		})
		.await
		.expect("store");

	assert_eq!(
		*harness.store.created_indexes.lock().expect("lock"),
		vec![
			"metadata.doc_type:keyword".to_string(),
			"metadata.year:integer".to_string(),
			"metadata.draft:bool".to_string(),
		]
	);
}
