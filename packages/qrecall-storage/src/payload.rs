//! Conversions between Qdrant's protobuf payload values and `serde_json`.

use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{PointId, Value, point_id::PointIdOptions, value::Kind},
};
use serde_json::{Map, Number, Value as JsonValue};
use uuid::Uuid;

use crate::{Error, Result};

pub fn to_json_map(payload: HashMap<String, Value>) -> Map<String, JsonValue> {
	payload.into_iter().map(|(key, value)| (key, to_json(value))).collect()
}

pub fn to_json(value: Value) -> JsonValue {
	match value.kind {
		None | Some(Kind::NullValue(_)) => JsonValue::Null,
		Some(Kind::BoolValue(flag)) => JsonValue::Bool(flag),
		Some(Kind::IntegerValue(number)) => JsonValue::from(number),
		Some(Kind::DoubleValue(number)) =>
			Number::from_f64(number).map(JsonValue::Number).unwrap_or(JsonValue::Null),
		Some(Kind::StringValue(text)) => JsonValue::String(text),
		Some(Kind::ListValue(list)) =>
			JsonValue::Array(list.values.into_iter().map(to_json).collect()),
		Some(Kind::StructValue(object)) => JsonValue::Object(to_json_map(object.fields)),
	}
}

pub fn from_json_map(map: Map<String, JsonValue>) -> Payload {
	let fields: HashMap<String, Value> =
		map.into_iter().map(|(key, value)| (key, Value::from(value))).collect();

	Payload::from(fields)
}

pub fn point_id_to_string(id: PointId) -> Option<String> {
	match id.point_id_options? {
		PointIdOptions::Uuid(text) => Some(text),
		PointIdOptions::Num(number) => Some(number.to_string()),
	}
}

/// Qdrant accepts unsigned integers and UUIDs as point ids.
pub fn parse_point_id(raw: &str) -> Result<PointId> {
	let trimmed = raw.trim();

	if let Ok(number) = trimmed.parse::<u64>() {
		return Ok(PointId::from(number));
	}

	let uuid = Uuid::parse_str(trimmed).map_err(|_| {
		Error::InvalidArgument(format!("Point id {raw:?} must be an unsigned integer or a UUID."))
	})?;

	Ok(PointId::from(uuid.to_string()))
}
