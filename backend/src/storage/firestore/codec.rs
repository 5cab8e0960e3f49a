//! Conversion between plain JSON and Firestore's typed value encoding.

use serde_json::{json, Map, Number, Value};

use crate::storage::traits::StoreError;

/// Encode a plain JSON value as a Firestore `Value`
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or(0.0) }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode a document body as a Firestore `fields` map
pub fn encode_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect()
}

/// Decode a Firestore `fields` map into a plain JSON object
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, StoreError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
        .collect()
}

/// Decode a single Firestore `Value`
pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::Codec(format!("expected typed value, got {}", value)))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| StoreError::Codec("empty typed value".to_string()))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(Value::Bool(inner.as_bool().unwrap_or(false))),
        "integerValue" => {
            // Integers arrive as decimal strings
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(|i| Value::Number(i.into()))
                .ok_or_else(|| StoreError::Codec(format!("bad integerValue {}", inner)))
        }
        "doubleValue" => {
            let f = match inner {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            f.and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| StoreError::Codec(format!("bad doubleValue {}", inner)))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Object(fields))
        }
        other => Err(StoreError::Codec(format!("unsupported value type {}", other))),
    }
}

/// Quote a field path segment when it is not a simple identifier
pub fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}
