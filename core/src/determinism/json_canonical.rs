use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonicalises `value` to UTF-8 JSON bytes with object keys sorted
/// lexicographically and no insignificant whitespace. Every hash, checksum,
/// cache key, and exported artifact in this crate is computed over this
/// representation, never over the in-memory record.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    let normalized = normalize_value(v)?;
    let s = serde_json::to_string(&normalized)?;
    Ok(s.into_bytes())
}

pub fn to_canonical_string<T: Serialize>(value: &T) -> CoreResult<String> {
    Ok(String::from_utf8(to_canonical_bytes(value)?)
        .expect("canonical JSON serialisation is always valid UTF-8"))
}

fn normalize_value(v: Value) -> CoreResult<Value> {
    match v {
        Value::Object(map) => {
            let mut btm: BTreeMap<String, Value> = BTreeMap::new();
            for (k, vv) in map {
                btm.insert(k, normalize_value(vv)?);
            }
            let mut out = serde_json::Map::new();
            for (k, vv) in btm {
                out.insert(k, vv);
            }
            Ok(Value::Object(out))
        }
        Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for vv in arr {
                out.push(normalize_value(vv)?);
            }
            Ok(Value::Array(out))
        }
        Value::Number(n) => {
            if n.is_f64() && !n.as_f64().unwrap().is_finite() {
                return Err(CoreError::DeterminismViolation(
                    "canonical JSON forbids non-finite numbers".to_string(),
                ));
            }
            Ok(Value::Number(n))
        }
        other => Ok(other),
    }
}
