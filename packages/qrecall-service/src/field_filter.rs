//! Filters assembled from the typed tool arguments declared in
//! `storage.qdrant.filterable_fields`.

use qdrant_client::qdrant::{
	Condition, Filter, Range, RepeatedIntegers, RepeatedStrings, r#match::MatchValue,
};
use serde_json::{Map, Value};

use crate::filter::FilterParseError;
use qrecall_config::{FieldType, FilterCondition, FilterableField};

/// Builds a filter from argument values keyed by field name.
///
/// Every key must name a field that has a condition. A `null` value counts as absent. Returns
/// `None` when no argument contributed a condition.
pub fn build_field_filter(
	fields: &[FilterableField],
	arguments: &Map<String, Value>,
) -> Result<Option<Filter>, FilterParseError> {
	let is_argument =
		|name: &str| fields.iter().any(|field| field.condition.is_some() && field.name == name);

	if let Some(unknown) = arguments.keys().find(|name| !is_argument(name)) {
		return Err(FilterParseError::new(&format!("$.{unknown}"), "not a filter argument."));
	}

	let mut filter = Filter::default();

	for field in fields {
		let Some(condition) = field.condition else { continue };
		let path = format!("$.{}", field.name);
		let Some(value) = arguments.get(&field.name).filter(|value| !value.is_null()) else {
			if field.required {
				return Err(FilterParseError::new(&path, "argument is required."));
			}

			continue;
		};
		let key = field.payload_path();

		match condition {
			FilterCondition::Eq => filter.must.push(exact(&key, field.field_type, value, &path)?),
			FilterCondition::Ne if field.field_type == FieldType::Boolean =>
				filter.must_not.push(exact(&key, field.field_type, value, &path)?),
			FilterCondition::Ne => {
				let single = Value::Array(vec![value.clone()]);

				filter.must.push(Condition::matches(
					key,
					except(listed(field.field_type, &single, &path)?),
				));
			},
			FilterCondition::Any =>
				filter.must.push(Condition::matches(key, listed(field.field_type, value, &path)?)),
			FilterCondition::Except => filter
				.must
				.push(Condition::matches(key, except(listed(field.field_type, value, &path)?))),
			range => filter.must.push(bounded(&key, field.field_type, range, value, &path)?),
		}
	}

	if filter.must.is_empty() && filter.must_not.is_empty() {
		return Ok(None);
	}

	Ok(Some(filter))
}

fn exact(
	key: &str,
	field_type: FieldType,
	value: &Value,
	path: &str,
) -> Result<Condition, FilterParseError> {
	match field_type {
		FieldType::Keyword => value
			.as_str()
			.map(|text| Condition::matches(key, text.to_string()))
			.ok_or_else(|| FilterParseError::new(path, "expected a string.")),
		FieldType::Integer => value
			.as_i64()
			.map(|int| Condition::matches(key, int))
			.ok_or_else(|| FilterParseError::new(path, "expected an integer.")),
		FieldType::Boolean => value
			.as_bool()
			.map(|flag| Condition::matches(key, flag))
			.ok_or_else(|| FilterParseError::new(path, "expected a boolean.")),
		FieldType::Float =>
			Err(FilterParseError::new(path, "float fields only support range conditions.")),
	}
}

fn listed(
	field_type: FieldType,
	value: &Value,
	path: &str,
) -> Result<MatchValue, FilterParseError> {
	let items = value
		.as_array()
		.filter(|items| !items.is_empty())
		.ok_or_else(|| FilterParseError::new(path, "expected a non-empty array."))?;

	match field_type {
		FieldType::Keyword => items
			.iter()
			.map(|item| item.as_str().map(str::to_string))
			.collect::<Option<Vec<_>>>()
			.map(|strings| MatchValue::Keywords(RepeatedStrings { strings }))
			.ok_or_else(|| FilterParseError::new(path, "array items must be strings.")),
		FieldType::Integer => items
			.iter()
			.map(Value::as_i64)
			.collect::<Option<Vec<_>>>()
			.map(|integers| MatchValue::Integers(RepeatedIntegers { integers }))
			.ok_or_else(|| FilterParseError::new(path, "array items must be integers.")),
		other => Err(FilterParseError::new(
			path,
			format!("{} fields do not support list conditions.", other.as_str()),
		)),
	}
}

fn except(value: MatchValue) -> MatchValue {
	match value {
		MatchValue::Keywords(strings) => MatchValue::ExceptKeywords(strings),
		MatchValue::Integers(integers) => MatchValue::ExceptIntegers(integers),
		other => other,
	}
}

fn bounded(
	key: &str,
	field_type: FieldType,
	condition: FilterCondition,
	value: &Value,
	path: &str,
) -> Result<Condition, FilterParseError> {
	let bound = match field_type {
		FieldType::Integer => value
			.as_i64()
			.map(|int| int as f64)
			.ok_or_else(|| FilterParseError::new(path, "expected an integer."))?,
		FieldType::Float =>
			value.as_f64().ok_or_else(|| FilterParseError::new(path, "expected a number."))?,
		other =>
			return Err(FilterParseError::new(
				path,
				format!("{} fields do not support range conditions.", other.as_str()),
			)),
	};
	let mut range = Range::default();

	match condition {
		FilterCondition::Gt => range.gt = Some(bound),
		FilterCondition::Gte => range.gte = Some(bound),
		FilterCondition::Lt => range.lt = Some(bound),
		FilterCondition::Lte => range.lte = Some(bound),
		other =>
			return Err(FilterParseError::new(
				path,
				format!("{} is not a range condition.", other.as_str()),
			)),
	}

	Ok(Condition::range(key, range))
}
