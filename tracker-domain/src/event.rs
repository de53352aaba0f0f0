//! Event objects and dotted-path access.
//!
//! Events travel through the daemon as `serde_json::Value` objects.
//! Modifiers address fields with dotted paths such as `attributes.host`.

use serde_json::{Map, Value};

use crate::error::DomainError;

/// Resolve a dotted path inside an event object.
///
/// Returns `None` if any segment is absent, if an intermediate value
/// is not an object, or if the final value is `null`.
pub fn get_specific_value<'a>(object: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = object;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Write `value` at a dotted path, creating intermediate objects.
///
/// Fails if an intermediate segment exists but is not an object.
pub fn set_specific_value(object: &mut Value, path: &str, value: Value) -> Result<(), DomainError> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(DomainError::InvalidPath(path.to_string()));
    }

    let mut segments = path.split('.').peekable();
    let mut current = object;
    while let Some(segment) = segments.next() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let map = match current {
            Value::Object(map) => map,
            _ => {
                return Err(DomainError::InvalidPath(format!(
                    "{} (segment {} is not an object)",
                    path, segment
                )))
            }
        };

        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return Ok(());
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    Ok(())
}
