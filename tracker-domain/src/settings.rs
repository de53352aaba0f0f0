//! Settings: immutable configuration for actions and modifiers.
//!
//! Settings are an ordered mapping from key to JSON value. They are
//! validated once by the factory that builds an action or modifier;
//! accessors return explicit errors instead of silently defaulting
//! when a value is present but has the wrong type.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::DomainError;

// =============================================================================
// Settings
// =============================================================================

/// Immutable, ordered key/value configuration.
///
/// A JSON `null` is treated the same as an absent key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, Value>);

impl Settings {
    /// Create empty settings.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build settings from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, DomainError> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            Value::Null => Ok(Self::new()),
            other => Err(DomainError::Serialization(format!(
                "settings must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Restore settings from their storage representation.
    pub fn from_serialization(serialized: &str) -> Result<Self, DomainError> {
        let value: Value = serde_json::from_str(serialized)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        Self::from_value(value)
    }

    /// Storage representation (compact JSON, keys sorted).
    pub fn to_serialization(&self) -> Result<String, DomainError> {
        serde_json::to_string(&self.0).map_err(|e| DomainError::Serialization(e.to_string()))
    }

    /// Return a copy with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw value for `key`, `None` when absent or null.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Whether `key` carries a non-null value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Required string setting.
    pub fn require_str(&self, key: &str) -> Result<&str, DomainError> {
        self.optional_str(key)?
            .ok_or_else(|| DomainError::MissingSetting(key.to_string()))
    }

    /// Optional string setting; present values must be strings.
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, DomainError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(DomainError::invalid_setting(
                key,
                format!("expected string, got {}", type_name(other)),
            )),
        }
    }

    /// Required unsigned integer setting. Numeric strings are accepted.
    pub fn require_u64(&self, key: &str) -> Result<u64, DomainError> {
        self.optional_u64(key)?
            .ok_or_else(|| DomainError::MissingSetting(key.to_string()))
    }

    /// Unsigned integer setting with a default for absent keys.
    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, DomainError> {
        Ok(self.optional_u64(key)?.unwrap_or(default))
    }

    fn optional_u64(&self, key: &str) -> Result<Option<u64>, DomainError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
                DomainError::invalid_setting(key, format!("expected unsigned integer, got {}", n))
            }),
            Some(Value::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| {
                DomainError::invalid_setting(key, format!("expected unsigned integer, got {:?}", s))
            }),
            Some(other) => Err(DomainError::invalid_setting(
                key,
                format!("expected unsigned integer, got {}", type_name(other)),
            )),
        }
    }

    /// Boolean setting with a default for absent keys.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, DomainError> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s == "y" || s == "true" => Ok(true),
            Some(Value::String(s)) if s == "n" || s == "false" => Ok(false),
            Some(other) => Err(DomainError::invalid_setting(
                key,
                format!("expected boolean, got {}", other),
            )),
        }
    }

    /// Nested object setting; absent keys yield `None`.
    pub fn optional_object(&self, key: &str) -> Result<Option<&Map<String, Value>>, DomainError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(DomainError::invalid_setting(
                key,
                format!("expected object, got {}", type_name(other)),
            )),
        }
    }

    /// List of strings; absent keys yield an empty list.
    pub fn string_list(&self, key: &str) -> Result<Vec<String>, DomainError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(DomainError::invalid_setting(
                        key,
                        format!("list entries must be strings, got {}", type_name(other)),
                    )),
                })
                .collect(),
            Some(other) => Err(DomainError::invalid_setting(
                key,
                format!("expected list, got {}", type_name(other)),
            )),
        }
    }

    /// Iterate over all non-null entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(_, v)| !v.is_null())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten into `dotted.key -> display string` pairs.
    ///
    /// Nested objects contribute dotted keys, arrays are joined with `", "`.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        for (key, value) in &self.0 {
            flatten_into(&mut flat, key, value);
        }
        flat
    }
}

impl From<BTreeMap<String, Value>> for Settings {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

fn flatten_into(flat: &mut BTreeMap<String, String>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(flat, &format!("{}.{}", prefix, key), nested);
            }
        }
        other => {
            flat.insert(prefix.to_string(), display_value(other));
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Placeholders
// =============================================================================

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").expect("valid placeholder pattern"))
}

/// Replace `{name}` tokens in `pattern` with values from `values`.
///
/// Tokens without a matching value are left untouched.
pub fn fill_placeholders(pattern: &str, values: &BTreeMap<String, String>) -> String {
    placeholder_pattern()
        .replace_all(pattern, |caps: &regex::Captures<'_>| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Settings {
        Settings::from_value(json!({
            "pattern": "^web",
            "replacement": "www",
            "limit": 5,
            "enabled": true,
            "nested": { "a": 1, "b": { "c": "deep" } },
            "args": ["-v", "--once"],
            "gone": null
        }))
        .unwrap()
    }

    #[test]
    fn test_serialization_is_lossless() {
        let settings = sample();
        let serialized = settings.to_serialization().unwrap();
        let restored = Settings::from_serialization(&serialized).unwrap();

        assert_eq!(settings, restored);
    }

    #[test]
    fn test_null_is_absent() {
        let settings = sample();

        assert!(!settings.has("gone"));
        assert!(settings.optional_str("gone").unwrap().is_none());
        assert_eq!(settings.iter().count(), 6);
    }

    #[test]
    fn test_typed_accessors() {
        let settings = sample();

        assert_eq!(settings.require_str("pattern").unwrap(), "^web");
        assert_eq!(settings.require_u64("limit").unwrap(), 5);
        assert_eq!(settings.u64_or("missing", 7).unwrap(), 7);
        assert!(settings.bool_or("enabled", false).unwrap());
        assert_eq!(settings.string_list("args").unwrap(), vec!["-v", "--once"]);
    }

    #[test]
    fn test_wrong_type_is_an_error_not_a_default() {
        let settings = sample();

        assert!(matches!(
            settings.require_str("limit"),
            Err(DomainError::InvalidSetting { .. })
        ));
        assert!(matches!(
            settings.u64_or("pattern", 1),
            Err(DomainError::InvalidSetting { .. })
        ));
        assert_eq!(
            settings.require_str("nope"),
            Err(DomainError::MissingSetting("nope".to_string()))
        );
    }

    #[test]
    fn test_from_value_rejects_scalars() {
        assert!(Settings::from_value(json!("text")).is_err());
        assert!(Settings::from_value(json!(null)).unwrap().is_empty());
    }

    #[test]
    fn test_flatten_nested() {
        let flat = sample().flatten();

        assert_eq!(flat.get("nested.a").map(String::as_str), Some("1"));
        assert_eq!(flat.get("nested.b.c").map(String::as_str), Some("deep"));
        assert_eq!(flat.get("args").map(String::as_str), Some("-v, --once"));
    }

    #[test]
    fn test_fill_placeholders() {
        let flat = sample().flatten();
        let text = fill_placeholders("Replace {pattern} with {replacement} ({unknown})", &flat);

        assert_eq!(text, "Replace ^web with www ({unknown})");
    }
}
