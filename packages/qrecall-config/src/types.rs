use serde::Deserialize;
use serde_json::{Map, Value};

pub const PAYLOAD_INDEX_SCHEMAS: [&str; 7] =
	["keyword", "integer", "float", "bool", "text", "datetime", "uuid"];

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub tools: Tools,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	#[serde(default = "default_mcp_bind")]
	pub mcp_bind: String,
	#[serde(default)]
	pub transport: Transport,
	pub log_level: String,
	/// Hides every tool that mutates Qdrant.
	#[serde(default)]
	pub read_only: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
	#[default]
	StreamableHttp,
	Stdio,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub api_key: Option<String>,
	#[serde(default = "default_qdrant_timeout_ms")]
	pub timeout_ms: u64,
	/// Used when a request names neither `collections` nor `collection_name`.
	pub default_collection: Option<String>,
	pub vector_dim: u32,
	#[serde(default)]
	pub payload_indexes: Vec<PayloadIndex>,
	/// Metadata fields that get a payload index and, when a condition is set, a typed filter
	/// argument on the find and delete tools.
	#[serde(default)]
	pub filterable_fields: Vec<FilterableField>,
}
impl Qdrant {
	/// Configured payload indexes followed by one index per filterable field not already listed.
	pub fn index_plan(&self) -> Vec<PayloadIndex> {
		let mut plan = self.payload_indexes.clone();

		for field in &self.filterable_fields {
			let path = field.payload_path();

			if plan.iter().all(|index| index.field != path) {
				plan.push(PayloadIndex {
					field: path,
					schema: field.field_type.index_schema().to_string(),
				});
			}
		}

		plan
	}

	/// Fields exposed as tool arguments. Fields without a condition are only indexed.
	pub fn filter_arguments(&self) -> impl Iterator<Item = (&FilterableField, FilterCondition)> {
		self.filterable_fields
			.iter()
			.filter_map(|field| field.condition.map(|condition| (field, condition)))
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct PayloadIndex {
	/// Payload path, e.g. "metadata.doc_type".
	pub field: String,
	pub schema: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FilterableField {
	/// Key under the stored `metadata` object, also used as the tool argument name.
	pub name: String,
	pub description: String,
	pub field_type: FieldType,
	#[serde(default)]
	pub condition: Option<FilterCondition>,
	#[serde(default)]
	pub required: bool,
}
impl FilterableField {
	pub fn payload_path(&self) -> String {
		format!("metadata.{}", self.name)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
	Keyword,
	Integer,
	Float,
	Boolean,
}
impl FieldType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Keyword => "keyword",
			Self::Integer => "integer",
			Self::Float => "float",
			Self::Boolean => "boolean",
		}
	}

	pub fn index_schema(self) -> &'static str {
		match self {
			Self::Boolean => "bool",
			other => other.as_str(),
		}
	}

	pub fn supports(self, condition: FilterCondition) -> bool {
		match self {
			Self::Keyword => !condition.is_range(),
			Self::Integer => true,
			Self::Float => condition.is_range(),
			Self::Boolean => matches!(condition, FilterCondition::Eq | FilterCondition::Ne),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum FilterCondition {
	#[serde(rename = "==")]
	Eq,
	#[serde(rename = "!=")]
	Ne,
	#[serde(rename = ">")]
	Gt,
	#[serde(rename = ">=")]
	Gte,
	#[serde(rename = "<")]
	Lt,
	#[serde(rename = "<=")]
	Lte,
	#[serde(rename = "any")]
	Any,
	#[serde(rename = "except")]
	Except,
}
impl FilterCondition {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Eq => "==",
			Self::Ne => "!=",
			Self::Gt => ">",
			Self::Gte => ">=",
			Self::Lt => "<",
			Self::Lte => "<=",
			Self::Any => "any",
			Self::Except => "except",
		}
	}

	pub fn is_range(self) -> bool {
		matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
	}

	/// `any` and `except` take a list of values rather than a single one.
	pub fn takes_list(self) -> bool {
		matches!(self, Self::Any | Self::Except)
	}
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	#[serde(default)]
	pub rerank: RerankProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	/// Named vector inside each collection. Empty selects the unnamed default vector.
	#[serde(default)]
	pub vector_name: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RerankProviderConfig {
	pub enabled: bool,
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub top_k: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}
impl Default for RerankProviderConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			provider_id: "rerank".to_string(),
			api_base: String::new(),
			api_key: String::new(),
			path: "/rerank".to_string(),
			model: String::new(),
			top_k: 8,
			timeout_ms: 10_000,
			default_headers: Map::new(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_limit: u32,
	/// Caps how many collections' worth of `limit` a multi-collection request may return.
	pub multi_collection_limit_multiplier: u32,
	pub allow_arbitrary_filter: bool,
	pub priority_strategy: PriorityStrategy,
	/// Highest priority first.
	pub priority_order: Vec<String>,
	/// Metadata keys rendered by the minimal response mode, in output order.
	pub minimal_fields: Vec<String>,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_limit: 5,
			multi_collection_limit_multiplier: 3,
			allow_arbitrary_filter: false,
			priority_strategy: PriorityStrategy::None,
			priority_order: Vec::new(),
			minimal_fields: default_minimal_fields(),
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityStrategy {
	#[default]
	None,
	Soft,
	Medium,
	Hard,
}
impl PriorityStrategy {
	pub fn boost_factor(self) -> Option<f32> {
		match self {
			Self::None => None,
			Self::Soft => Some(1.1),
			Self::Medium => Some(1.25),
			Self::Hard => Some(1.5),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Tools {
	pub find_description: Option<String>,
	pub store_description: Option<String>,
	pub retrieve_description: Option<String>,
	pub delete_description: Option<String>,
}

fn default_mcp_bind() -> String {
	"127.0.0.1:8000".to_string()
}

fn default_qdrant_timeout_ms() -> u64 {
	10_000
}

fn default_minimal_fields() -> Vec<String> {
	[
		"ip_addresses",
		"hostnames",
		"ports",
		"domains",
		"urls",
		"service_name",
		"stack_name",
		"file_name",
		"source",
		"doc_type",
	]
	.into_iter()
	.map(str::to_string)
	.collect()
}
