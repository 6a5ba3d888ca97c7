//! Weather payload model.
//!
//! A payload is an arbitrary JSON object. The relay only ever adds the
//! provenance keys below; fields already present are never rewritten.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Key holding the identity of the component that processed the payload.
pub const PROCESSED_BY: &str = "processed_by";

/// Key holding the RFC-3339 processing timestamp.
pub const PROCESSED_AT: &str = "processed_at";

/// Field a weather payload must carry to be forwarded.
pub const DEFAULT_REQUIRED_FIELD: &str = "data";

/// Decoded message body.
pub type Payload = Map<String, Value>;

/// Decode a message body into a JSON object.
pub fn decode(body: &[u8]) -> Result<Payload> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::NotAnObject),
    }
}

/// Inject the provenance marker and processing timestamp.
///
/// Returns the keys that were actually inserted.
pub fn augment(payload: &mut Payload, processed_by: &str, at: DateTime<Utc>) -> Vec<&'static str> {
    let mut inserted = Vec::with_capacity(2);
    let stamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    for (key, value) in [(PROCESSED_BY, processed_by.to_string()), (PROCESSED_AT, stamp)] {
        if !payload.contains_key(key) {
            payload.insert(key.to_string(), Value::String(value));
            inserted.push(key);
        }
    }
    inserted
}

/// Whether the payload carries `field` at the top level.
pub fn has_field(payload: &Payload, field: &str) -> bool {
    payload.contains_key(field)
}
