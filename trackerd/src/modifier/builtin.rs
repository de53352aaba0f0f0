//! Built-in modifiers.
//!
//! String modifiers leave non-string values untouched.

use std::net::IpAddr;

use regex::Regex;
use serde_json::{Map, Value};
use tracker_domain::{get_specific_value, Settings};

use super::Modifier;
use crate::error::{DaemonError, DaemonResult};

fn map_str(value: &Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

macro_rules! string_modifier {
    ($name:ident, $doc:literal, $f:expr) => {
        #[doc = $doc]
        pub struct $name {
            settings: Settings,
        }

        impl $name {
            /// Build from settings (none are used).
            pub fn create(settings: Settings) -> DaemonResult<Box<dyn Modifier>> {
                Ok(Box::new(Self { settings }))
            }
        }

        impl Modifier for $name {
            fn settings(&self) -> &Settings {
                &self.settings
            }

            fn simple_transform(&self, value: &Value) -> DaemonResult<Value> {
                Ok(map_str(value, $f))
            }
        }
    };
}

string_modifier!(LowerCase, "Lower-cases strings.", |s: &str| s.to_lowercase());
string_modifier!(UpperCase, "Upper-cases strings.", |s: &str| s.to_uppercase());
string_modifier!(Trim, "Strips surrounding whitespace.", |s: &str| s.trim().to_string());

// =============================================================================
// Regex Replace
// =============================================================================

/// Replaces every match of `pattern` with `replacement` (`$1` refers to groups).
pub struct RegexReplace {
    settings: Settings,
    pattern: Regex,
    replacement: String,
}

impl RegexReplace {
    /// Build from settings; the pattern is compiled once here.
    pub fn create(settings: Settings) -> DaemonResult<Box<dyn Modifier>> {
        let pattern = Regex::new(settings.require_str("pattern").map_err(DaemonError::settings)?)?;
        let replacement = settings
            .optional_str("replacement")
            .map_err(DaemonError::settings)?
            .unwrap_or_default()
            .to_string();
        Ok(Box::new(Self {
            settings,
            pattern,
            replacement,
        }))
    }
}

impl Modifier for RegexReplace {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn description_pattern(&self) -> Option<&str> {
        Some("Replace {pattern} with '{replacement}'")
    }

    fn simple_transform(&self, value: &Value) -> DaemonResult<Value> {
        Ok(map_str(value, |s| {
            self.pattern
                .replace_all(s, self.replacement.as_str())
                .into_owned()
        }))
    }
}

// =============================================================================
// Map Lookup
// =============================================================================

/// Looks the value up in `map`; unknown values map to `default` when set,
/// otherwise nothing is written.
pub struct MapLookup {
    settings: Settings,
    map: Map<String, Value>,
    default: Option<Value>,
}

impl MapLookup {
    /// Build from settings.
    pub fn create(settings: Settings) -> DaemonResult<Box<dyn Modifier>> {
        let map = settings
            .optional_object("map")
            .map_err(DaemonError::settings)?
            .cloned()
            .ok_or_else(|| DaemonError::Settings("Missing setting: map".to_string()))?;
        let default = settings.get("default").cloned();
        Ok(Box::new(Self {
            settings,
            map,
            default,
        }))
    }

    fn key(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl Modifier for MapLookup {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn description_pattern(&self) -> Option<&str> {
        Some("Look up in table, default '{default}'")
    }

    fn transform(&self, event: &Value, property: &str) -> DaemonResult<Option<Value>> {
        let Some(value) = get_specific_value(event, property) else {
            return Ok(None);
        };
        let mapped = Self::key(value).and_then(|key| self.map.get(&key).cloned());
        Ok(mapped.or_else(|| self.default.clone()))
    }
}

// =============================================================================
// Shorten Hostname
// =============================================================================

/// `web1.example.com` becomes `web1`. IP addresses stay intact.
pub struct ShortenHostname {
    settings: Settings,
}

impl ShortenHostname {
    /// Build from settings (none are used).
    pub fn create(settings: Settings) -> DaemonResult<Box<dyn Modifier>> {
        Ok(Box::new(Self { settings }))
    }
}

impl Modifier for ShortenHostname {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn simple_transform(&self, value: &Value) -> DaemonResult<Value> {
        Ok(map_str(value, |host| {
            if host.parse::<IpAddr>().is_ok() {
                return host.to_string();
            }
            host.split('.').next().unwrap_or(host).to_string()
        }))
    }
}

// =============================================================================
// Set Value
// =============================================================================

/// Writes a constant wherever the source property is present.
pub struct SetValue {
    settings: Settings,
    value: Value,
}

impl SetValue {
    /// Build from settings.
    pub fn create(settings: Settings) -> DaemonResult<Box<dyn Modifier>> {
        let value = settings
            .get("value")
            .cloned()
            .ok_or_else(|| DaemonError::Settings("Missing setting: value".to_string()))?;
        Ok(Box::new(Self { settings, value }))
    }
}

impl Modifier for SetValue {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn description_pattern(&self) -> Option<&str> {
        Some("Set to '{value}'")
    }

    fn simple_transform(&self, _value: &Value) -> DaemonResult<Value> {
        Ok(self.value.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(modifier: &dyn Modifier, value: Value) -> Option<Value> {
        modifier.transform(&json!({ "field": value }), "field").unwrap()
    }

    #[test]
    fn test_case_and_trim() {
        let lower = LowerCase::create(Settings::new()).unwrap();
        let upper = UpperCase::create(Settings::new()).unwrap();
        let trim = Trim::create(Settings::new()).unwrap();

        assert_eq!(apply(lower.as_ref(), json!("WEB1")), Some(json!("web1")));
        assert_eq!(apply(upper.as_ref(), json!("crit")), Some(json!("CRIT")));
        assert_eq!(apply(trim.as_ref(), json!("  x ")), Some(json!("x")));
        assert_eq!(apply(lower.as_ref(), json!(5)), Some(json!(5)));
    }

    #[test]
    fn test_regex_replace_with_groups() {
        let settings = Settings::new()
            .with("pattern", r"^(\w+)-prod$")
            .with("replacement", "$1");
        let modifier = RegexReplace::create(settings).unwrap();

        assert_eq!(apply(modifier.as_ref(), json!("db-prod")), Some(json!("db")));
        assert_eq!(
            modifier.instance_description().as_deref(),
            Some(r"Replace ^(\w+)-prod$ with '$1'")
        );
    }

    #[test]
    fn test_regex_replace_rejects_bad_pattern() {
        let settings = Settings::new().with("pattern", "(unclosed");

        assert!(matches!(RegexReplace::create(settings), Err(DaemonError::Settings(_))));
    }

    #[test]
    fn test_map_lookup_with_and_without_default() {
        let map = json!({ "0": "ok", "2": "critical" });
        let strict = MapLookup::create(Settings::new().with("map", map.clone())).unwrap();
        let lenient =
            MapLookup::create(Settings::new().with("map", map).with("default", "unknown")).unwrap();

        assert_eq!(apply(strict.as_ref(), json!(2)), Some(json!("critical")));
        assert_eq!(apply(strict.as_ref(), json!(7)), None);
        assert_eq!(apply(lenient.as_ref(), json!(7)), Some(json!("unknown")));
        assert_eq!(lenient.transform(&json!({}), "field").unwrap(), None);
    }

    #[test]
    fn test_shorten_hostname_keeps_ip_addresses() {
        let modifier = ShortenHostname::create(Settings::new()).unwrap();

        assert_eq!(apply(modifier.as_ref(), json!("web1.example.com")), Some(json!("web1")));
        assert_eq!(apply(modifier.as_ref(), json!("10.0.0.12")), Some(json!("10.0.0.12")));
        assert_eq!(apply(modifier.as_ref(), json!("::1")), Some(json!("::1")));
    }

    #[test]
    fn test_set_value_only_when_present() {
        let modifier = SetValue::create(Settings::new().with("value", "ops")).unwrap();

        assert_eq!(apply(modifier.as_ref(), json!("anything")), Some(json!("ops")));
        assert_eq!(modifier.transform(&json!({}), "field").unwrap(), None);
        assert!(SetValue::create(Settings::new()).is_err());
    }
}
