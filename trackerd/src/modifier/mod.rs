//! Modifiers: named field transforms applied to events before they become
//! issues.
//!
//! A modifier is a pure function of its settings and the event object.
//! Absent or null source values short-circuit: `transform` never reaches
//! `simple_transform` for them, so chains need no null checks per step.

mod builtin;
mod pipeline;

pub use builtin::{
    LowerCase, MapLookup, RegexReplace, SetValue, ShortenHostname, Trim, UpperCase,
};
pub use pipeline::{ModifierPipeline, ModifierStep};

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracker_domain::{fill_placeholders, get_specific_value, Settings};

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Modifier
// =============================================================================

/// A single field transform.
pub trait Modifier: Send + Sync {
    /// Settings this instance was built from.
    fn settings(&self) -> &Settings;

    /// Pattern for `instance_description`, with `{setting}` placeholders.
    fn description_pattern(&self) -> Option<&str> {
        None
    }

    /// Transform the value found at `property` (a dotted path).
    ///
    /// Returns `None` when the source value is absent or null, or when the
    /// modifier has nothing to write.
    fn transform(&self, event: &Value, property: &str) -> DaemonResult<Option<Value>> {
        match get_specific_value(event, property) {
            None => Ok(None),
            Some(value) => self.simple_transform(value).map(Some),
        }
    }

    /// Transform a present value. Identity by default.
    fn simple_transform(&self, value: &Value) -> DaemonResult<Value> {
        Ok(value.clone())
    }

    /// Human description of this configured instance.
    fn instance_description(&self) -> Option<String> {
        self.description_pattern()
            .map(|pattern| fill_placeholders(pattern, &self.settings().flatten()))
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Builds a modifier from its settings.
pub type ModifierFactory = fn(Settings) -> DaemonResult<Box<dyn Modifier>>;

/// Metadata of a modifier type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifierDescriptor {
    /// Registry key
    pub type_name: &'static str,
    /// Short label
    pub label: &'static str,
    /// What the modifier does
    pub description: &'static str,
}

struct Entry {
    descriptor: ModifierDescriptor,
    factory: ModifierFactory,
}

/// Registry of modifier types.
pub struct ModifierRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl ModifierRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// A registry with every built-in modifier.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            "lower_case",
            "Lower case",
            "Converts a string to lower case",
            LowerCase::create,
        );
        registry.register(
            "upper_case",
            "Upper case",
            "Converts a string to upper case",
            UpperCase::create,
        );
        registry.register(
            "trim",
            "Trim",
            "Strips leading and trailing whitespace",
            Trim::create,
        );
        registry.register(
            "regex_replace",
            "Regular expression",
            "Replaces every match of a pattern",
            RegexReplace::create,
        );
        registry.register(
            "map_lookup",
            "Lookup table",
            "Maps known values to replacements",
            MapLookup::create,
        );
        registry.register(
            "shorten_hostname",
            "Short host name",
            "Strips the domain part from a host name",
            ShortenHostname::create,
        );
        registry.register(
            "set_value",
            "Set value",
            "Replaces a present value with a constant",
            SetValue::create,
        );
        registry
    }

    /// Add (or replace) a modifier type.
    pub fn register(
        &mut self,
        type_name: &'static str,
        label: &'static str,
        description: &'static str,
        factory: ModifierFactory,
    ) {
        let descriptor = ModifierDescriptor {
            type_name,
            label,
            description,
        };
        self.entries.insert(type_name, Entry { descriptor, factory });
    }

    /// Known type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Metadata of every type, sorted by name.
    pub fn descriptors(&self) -> Vec<ModifierDescriptor> {
        self.entries.values().map(|e| e.descriptor.clone()).collect()
    }

    /// Build a modifier of type `type_name`.
    pub fn create(&self, type_name: &str, settings: Settings) -> DaemonResult<Box<dyn Modifier>> {
        let entry = self.entries.get(type_name).ok_or_else(|| {
            DaemonError::Config(format!(
                "Unknown modifier type: {}. Expected one of: {}",
                type_name,
                self.type_names().join(", ")
            ))
        })?;
        (entry.factory)(settings)
    }
}

impl Default for ModifierRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
