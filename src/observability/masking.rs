//! Sensitive field masking for logged payloads.
//!
//! Masking is best-effort: anything that cannot be parsed is logged as-is,
//! and none of these functions can fail or panic.
//!
//! Payloads may nest arbitrarily deep. Parsing runs without serde_json's
//! recursion limit and grows the stack on demand, re-serialising does the
//! same, and parsed values are torn down iteratively.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Replacement written in place of a sensitive value.
pub const REDACTION_MARKER: &str = "*****";

/// Remaining stack below which a new segment is allocated.
const STACK_RED_ZONE: usize = 64 * 1024;

/// Size of each stack segment allocated for deep payloads.
const STACK_SEGMENT: usize = 1024 * 1024;

/// Field names whose values are never logged. Compared case-insensitively.
pub const SENSITIVE_KEYS: [&str; 7] = [
    "password",
    "token",
    "authorization",
    "secret",
    "apikey",
    "api_key",
    "cookie",
];

/// Check whether `key` names a sensitive field.
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|s| s.eq_ignore_ascii_case(key))
}

/// Redact every sensitive field of `value` in place.
///
/// Returns the number of fields replaced. Redacted subtrees are not visited.
pub fn mask_value(value: &mut Value) -> usize {
    let mut masked = 0;
    // Explicit stack: caller-built values may nest deeper than the call stack allows.
    let mut stack: Vec<&mut Value> = vec![value];

    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if is_sensitive_key(key) {
                        *child = Value::String(REDACTION_MARKER.to_string());
                        masked += 1;
                    } else {
                        stack.push(child);
                    }
                }
            }
            Value::Array(items) => stack.extend(items.iter_mut()),
            _ => {}
        }
    }

    masked
}

/// Mask a raw payload that may contain JSON.
///
/// Empty and non-JSON payloads come back untouched, as do JSON payloads
/// without any sensitive field.
pub fn mask_json_bytes(data: &[u8]) -> Bytes {
    if data.is_empty() {
        return Bytes::new();
    }

    let mut value = match parse_unbounded(data) {
        Ok(value) => value,
        Err(_) => return Bytes::copy_from_slice(data),
    };

    let masked = if mask_value(&mut value) == 0 {
        Bytes::copy_from_slice(data)
    } else {
        match serde_json::to_vec(&Deep(&value)) {
            Ok(masked) => Bytes::from(masked),
            // The raw bytes hold a secret at this point.
            Err(_) => Bytes::from_static(REDACTION_MARKER.as_bytes()),
        }
    };

    dispose(value);
    masked
}

fn parse_unbounded(data: &[u8]) -> Result<Value, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_slice(data);
    de.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

/// Serializes a value like `Value` does, growing the stack as it descends.
struct Deep<'a>(&'a Value);

impl Serialize for Deep<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || match self.0 {
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Deep(item))?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, child) in map {
                    out.serialize_entry(key, &Deep(child))?;
                }
                out.end()
            }
            scalar => scalar.serialize(serializer),
        })
    }
}

/// Drop `value` without recursing; the derived `Drop` recurses per level.
fn dispose(value: Value) {
    let mut stack = vec![value];
    while let Some(current) = stack.pop() {
        match current {
            Value::Array(items) => stack.extend(items),
            Value::Object(map) => stack.extend(map.into_iter().map(|(_, child)| child)),
            _ => {}
        }
    }
}

/// Mask a multi-valued map such as headers or query parameters.
pub fn mask_multimap(map: BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    map.into_iter()
        .map(|(key, values)| {
            if is_sensitive_key(&key) {
                (key, vec![REDACTION_MARKER.to_string()])
            } else {
                (key, values)
            }
        })
        .collect()
}
