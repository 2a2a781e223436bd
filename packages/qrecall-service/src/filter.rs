//! Translation of Qdrant REST-style filter JSON into the gRPC filter type.

use std::fmt::{Display, Formatter};

use qdrant_client::qdrant::{
	Condition, Filter, PointId, Range, RepeatedIntegers, RepeatedStrings, r#match::MatchValue,
};
use serde_json::{Map, Value};

use crate::{Error, RecallService, Result, field_filter::build_field_filter};

const MAX_FILTER_DEPTH: usize = 8;
const MAX_FILTER_NODES: usize = 128;

#[derive(Debug, Clone)]
pub struct FilterParseError {
	path: String,
	message: String,
}
impl FilterParseError {
	pub(crate) fn new(path: &str, message: impl Into<String>) -> Self {
		Self { path: path.to_string(), message: message.into() }
	}

	pub fn path(&self) -> &str {
		&self.path
	}
}
impl Display for FilterParseError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.path, self.message)
	}
}

#[derive(Default)]
struct FilterParseState {
	nodes: usize,
	max_depth: usize,
}
impl FilterParseState {
	fn visit(&mut self, path: &str, depth: usize) -> Result<(), FilterParseError> {
		self.nodes = self.nodes.saturating_add(1);
		self.max_depth = self.max_depth.max(depth);

		if self.nodes > MAX_FILTER_NODES {
			return Err(FilterParseError::new(
				path,
				format!("filter exceeds node limit ({}/{})", self.nodes, MAX_FILTER_NODES),
			));
		}
		if self.max_depth > MAX_FILTER_DEPTH {
			return Err(FilterParseError::new(
				path,
				format!("filter exceeds depth limit ({}/{})", self.max_depth, MAX_FILTER_DEPTH),
			));
		}

		Ok(())
	}
}

/// Parses a filter such as `{"must": [{"key": "metadata.source", "match": {"value": "wiki"}}]}`.
pub fn parse_filter(raw: &Value, path: &str) -> Result<Filter, FilterParseError> {
	let mut state = FilterParseState::default();

	parse_filter_at(raw, path, 1, &mut state)
}

impl RecallService {
	/// Resolves the request filter. Typed field arguments take precedence: when any filterable
	/// field declares a condition, `query_filter` is refused. Otherwise a caller-supplied filter
	/// is parsed only if arbitrary filters are enabled.
	pub(crate) fn request_filter(
		&self,
		raw: Option<&Value>,
		arguments: &Map<String, Value>,
	) -> Result<Option<Filter>> {
		let qdrant = &self.cfg.storage.qdrant;
		let raw = raw.filter(|raw| !raw.is_null());
		let typed = build_field_filter(&qdrant.filterable_fields, arguments)?;

		if qdrant.filter_arguments().next().is_some() {
			if raw.is_some() {
				return Err(Error::InvalidRequest {
					message: "query_filter is not accepted when storage.qdrant.filterable_fields declare filter arguments."
						.to_string(),
				});
			}

			return Ok(typed);
		}

		let Some(raw) = raw else { return Ok(None) };

		if !self.cfg.search.allow_arbitrary_filter {
			return Err(Error::InvalidRequest {
				message: "query_filter is not allowed unless search.allow_arbitrary_filter is true."
					.to_string(),
			});
		}

		Ok(Some(parse_filter(raw, "$.query_filter")?))
	}
}

fn parse_filter_at(
	value: &Value,
	path: &str,
	depth: usize,
	state: &mut FilterParseState,
) -> Result<Filter, FilterParseError> {
	state.visit(path, depth)?;

	let obj = value
		.as_object()
		.ok_or_else(|| FilterParseError::new(path, "filter must be an object."))?;
	let mut filter = Filter::default();

	for (key, clause) in obj {
		let clause_path = format!("{path}.{key}");
		let conditions = match key.as_str() {
			"must" | "should" | "must_not" => parse_clause(clause, &clause_path, depth, state)?,
			other =>
				return Err(FilterParseError::new(
					&clause_path,
					format!("unsupported clause '{other}', expected must, should, or must_not."),
				)),
		};

		match key.as_str() {
			"must" => filter.must = conditions,
			"should" => filter.should = conditions,
			_ => filter.must_not = conditions,
		}
	}

	Ok(filter)
}

fn parse_clause(
	value: &Value,
	path: &str,
	depth: usize,
	state: &mut FilterParseState,
) -> Result<Vec<Condition>, FilterParseError> {
	match value {
		Value::Array(items) => items
			.iter()
			.enumerate()
			.map(|(index, item)| {
				parse_condition(item, &format!("{path}[{index}]"), depth.saturating_add(1), state)
			})
			.collect(),
		Value::Object(_) => Ok(vec![parse_condition(value, path, depth.saturating_add(1), state)?]),
		_ => Err(FilterParseError::new(path, "clause must be an object or an array of objects.")),
	}
}

fn parse_condition(
	value: &Value,
	path: &str,
	depth: usize,
	state: &mut FilterParseState,
) -> Result<Condition, FilterParseError> {
	let obj = value
		.as_object()
		.ok_or_else(|| FilterParseError::new(path, "condition must be an object."))?;

	if ["must", "should", "must_not"].iter().any(|clause| obj.contains_key(*clause)) {
		return Ok(Condition::from(parse_filter_at(value, path, depth, state)?));
	}

	state.visit(path, depth)?;

	if let Some(inner) = obj.get("is_empty") {
		return Ok(Condition::is_empty(required_key(inner, &format!("{path}.is_empty"))?));
	}
	if let Some(inner) = obj.get("is_null") {
		return Ok(Condition::is_null(required_key(inner, &format!("{path}.is_null"))?));
	}
	if let Some(ids) = obj.get("has_id") {
		return Ok(Condition::has_id(parse_ids(ids, &format!("{path}.has_id"))?));
	}

	let key = obj
		.get("key")
		.and_then(Value::as_str)
		.filter(|key| !key.trim().is_empty())
		.ok_or_else(|| {
			FilterParseError::new(
				path,
				"condition requires key, is_empty, is_null, has_id, or a nested filter.",
			)
		})?;

	if let Some(raw) = obj.get("match") {
		return parse_match(key, raw, &format!("{path}.match"));
	}
	if let Some(raw) = obj.get("range") {
		return parse_range(key, raw, &format!("{path}.range"));
	}

	Err(FilterParseError::new(path, format!("condition for key '{key}' requires match or range.")))
}

fn required_key(value: &Value, path: &str) -> Result<String, FilterParseError> {
	value
		.get("key")
		.and_then(Value::as_str)
		.filter(|key| !key.trim().is_empty())
		.map(str::to_string)
		.ok_or_else(|| FilterParseError::new(path, "key is required."))
}

fn parse_match(key: &str, value: &Value, path: &str) -> Result<Condition, FilterParseError> {
	let obj =
		value.as_object().ok_or_else(|| FilterParseError::new(path, "match must be an object."))?;

	if let Some(exact) = obj.get("value") {
		return match exact {
			Value::String(text) => Ok(Condition::matches(key, text.clone())),
			Value::Bool(flag) => Ok(Condition::matches(key, *flag)),
			Value::Number(number) =>
				number.as_i64().map(|int| Condition::matches(key, int)).ok_or_else(|| {
					FilterParseError::new(
						&format!("{path}.value"),
						"numeric match values must be integers.",
					)
				}),
			_ => Err(FilterParseError::new(
				&format!("{path}.value"),
				"match value must be a string, integer, or boolean.",
			)),
		};
	}
	if let Some(any) = obj.get("any") {
		return Ok(Condition::matches(key, parse_match_list(any, &format!("{path}.any"))?));
	}
	if let Some(except) = obj.get("except") {
		let value = match parse_match_list(except, &format!("{path}.except"))? {
			MatchValue::Keywords(strings) => MatchValue::ExceptKeywords(strings),
			MatchValue::Integers(integers) => MatchValue::ExceptIntegers(integers),
			other => other,
		};

		return Ok(Condition::matches(key, value));
	}
	if let Some(text) = obj.get("text") {
		let text = text.as_str().ok_or_else(|| {
			FilterParseError::new(&format!("{path}.text"), "text must be a string.")
		})?;

		return Ok(Condition::matches_text(key, text));
	}

	Err(FilterParseError::new(path, "match requires one of value, any, except, or text."))
}

/// A non-empty list of only strings or only integers.
fn parse_match_list(value: &Value, path: &str) -> Result<MatchValue, FilterParseError> {
	let items = value
		.as_array()
		.filter(|items| !items.is_empty())
		.ok_or_else(|| FilterParseError::new(path, "expected a non-empty array."))?;

	if let Some(strings) =
		items.iter().map(|item| item.as_str().map(str::to_string)).collect::<Option<Vec<_>>>()
	{
		return Ok(MatchValue::Keywords(RepeatedStrings { strings }));
	}
	if let Some(integers) = items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
		return Ok(MatchValue::Integers(RepeatedIntegers { integers }));
	}

	Err(FilterParseError::new(path, "array items must be all strings or all integers."))
}

fn parse_range(key: &str, value: &Value, path: &str) -> Result<Condition, FilterParseError> {
	let obj =
		value.as_object().ok_or_else(|| FilterParseError::new(path, "range must be an object."))?;
	let bound = |name: &str| -> Result<Option<f64>, FilterParseError> {
		match obj.get(name) {
			None | Some(Value::Null) => Ok(None),
			Some(value) => value.as_f64().map(Some).ok_or_else(|| {
				FilterParseError::new(&format!("{path}.{name}"), "range bounds must be numbers.")
			}),
		}
	};
	let range =
		Range { lt: bound("lt")?, gt: bound("gt")?, gte: bound("gte")?, lte: bound("lte")? };

	if range.lt.is_none() && range.gt.is_none() && range.gte.is_none() && range.lte.is_none() {
		return Err(FilterParseError::new(
			path,
			"range requires at least one of gt, gte, lt, or lte.",
		));
	}

	Ok(Condition::range(key, range))
}

fn parse_ids(value: &Value, path: &str) -> Result<Vec<PointId>, FilterParseError> {
	let items = value
		.as_array()
		.filter(|items| !items.is_empty())
		.ok_or_else(|| FilterParseError::new(path, "has_id must be a non-empty array."))?;

	items
		.iter()
		.enumerate()
		.map(|(index, item)| match item {
			Value::Number(number) => number.as_u64().map(PointId::from).ok_or_else(|| {
				FilterParseError::new(&format!("{path}[{index}]"), "numeric ids must be unsigned.")
			}),
			Value::String(text) => qrecall_storage::payload::parse_point_id(text)
				.map_err(|err| FilterParseError::new(&format!("{path}[{index}]"), err.to_string())),
			_ => Err(FilterParseError::new(
				&format!("{path}[{index}]"),
				"ids must be strings or unsigned integers.",
			)),
		})
		.collect()
}
