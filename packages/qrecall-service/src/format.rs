//! Text rendering of ranked entries for tool responses.

use std::{fmt::Write as _, str::FromStr};

use serde::Serialize;
use serde_json::Value;

use crate::{Entry, Error, RankedPool};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
	/// Id, score, collection, and selected metadata fields. Never the content.
	#[default]
	Minimal,
	Full,
}
impl ResponseMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Minimal => "minimal",
			Self::Full => "full",
		}
	}
}
impl FromStr for ResponseMode {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim() {
			"minimal" => Ok(Self::Minimal),
			"full" => Ok(Self::Full),
			other => Err(Error::InvalidRequest {
				message: format!("mode must be one of minimal or full, got {other:?}."),
			}),
		}
	}
}

pub fn format(pool: &RankedPool, mode: ResponseMode, minimal_fields: &[String]) -> Vec<String> {
	pool.as_slice()
		.iter()
		.map(|entry| match mode {
			ResponseMode::Minimal => format_minimal(entry, minimal_fields),
			ResponseMode::Full => format_full(entry),
		})
		.collect()
}

pub fn format_minimal(entry: &Entry, fields: &[String]) -> String {
	let mut parts = vec![format!("ID: {}", entry_id(entry))];

	if let Some(score) = finite_score(entry) {
		parts.push(format!("score: {score:.4}"));
	}
	if let Some(collection) = entry.collection() {
		parts.push(format!("collection: {collection}"));
	}
	if let Some(metadata) = entry.metadata.as_ref() {
		for field in fields {
			if let Some(value) = metadata.get(field).and_then(render_value) {
				parts.push(format!("{field}: {value}"));
			}
		}
	}

	parts.join(" | ")
}

pub fn format_full(entry: &Entry) -> String {
	let mut out = String::from("---\n");

	let _ = writeln!(out, "ID: {}", entry_id(entry));

	if let Some(score) = finite_score(entry) {
		let _ = writeln!(out, "Score: {score:.4}");
	}
	if let Some(collection) = entry.collection() {
		let _ = writeln!(out, "Collection: {collection}");
	}
	if let Some(metadata) = entry.metadata.as_ref().filter(|metadata| !metadata.is_empty()) {
		let _ = writeln!(out, "Metadata: {}", Value::Object(metadata.clone()));
	}

	let _ = write!(out, "\n{}\n---", entry.content);

	out
}

/// Single-point rendering used by exact id lookups.
pub fn format_retrieved(entry: &Entry) -> String {
	let metadata = entry
		.metadata
		.as_ref()
		.and_then(|metadata| serde_json::to_string_pretty(metadata).ok())
		.unwrap_or_else(|| "{}".to_string());

	format!(
		"<entry><id>{}</id><content>{}</content><metadata>{metadata}</metadata></entry>",
		entry_id(entry),
		entry.content
	)
}

fn entry_id(entry: &Entry) -> &str {
	entry.id.as_deref().unwrap_or("unknown")
}

fn finite_score(entry: &Entry) -> Option<f32> {
	entry.score.filter(|score| score.is_finite())
}

fn render_value(value: &Value) -> Option<String> {
	match value {
		Value::Null => None,
		Value::String(text) if text.is_empty() => None,
		Value::String(text) => Some(text.clone()),
		Value::Array(items) if items.is_empty() => None,
		Value::Array(items) => Some(
			items
				.iter()
				.filter_map(render_value)
				.collect::<Vec<_>>()
				.join(", "),
		),
		other => Some(other.to_string()),
	}
}
