use serde_json::{Map, Value};

/// A nearest-neighbour hit with its payload decoded to JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredHit {
	pub id: Option<String>,
	pub score: f32,
	pub payload: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredPoint {
	pub id: Option<String>,
	pub payload: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
	pub status: String,
	pub operation_id: Option<u64>,
}

pub struct SearchQuery<'a> {
	pub collection: &'a str,
	pub vector: Vec<f32>,
	/// Empty selects the collection's unnamed vector.
	pub vector_name: &'a str,
	pub limit: u64,
	pub filter: Option<qdrant_client::qdrant::Filter>,
}

pub struct NewPoint<'a> {
	pub collection: &'a str,
	pub id: String,
	pub vector_name: &'a str,
	pub vector: Vec<f32>,
	pub payload: Map<String, Value>,
}

pub enum DeleteSelector {
	Ids(Vec<String>),
	Filter(qdrant_client::qdrant::Filter),
}
