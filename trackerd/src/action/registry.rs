//! Action types by name: factories plus descriptive metadata.

use std::collections::BTreeMap;

use serde::Serialize;
use tracker_domain::Settings;
use uuid::Uuid;

use super::{Action, CommandAction, IntervalAction};
use crate::error::{DaemonError, DaemonResult};

/// Builds an action from its settings, id and name.
pub type ActionFactory = fn(Settings, Uuid, String) -> DaemonResult<Box<dyn Action>>;

/// Kind of a configurable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    List,
    Object,
}

/// One configurable setting of an action type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    /// Settings key
    pub name: &'static str,
    /// Short label
    pub label: &'static str,
    /// Value kind
    pub kind: FieldKind,
    /// Whether the key must be present
    pub required: bool,
    /// Help text
    pub description: &'static str,
}

impl FormField {
    /// A required field.
    pub const fn required(
        name: &'static str,
        label: &'static str,
        kind: FieldKind,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            kind,
            required: true,
            description,
        }
    }

    /// An optional field.
    pub const fn optional(
        name: &'static str,
        label: &'static str,
        kind: FieldKind,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            description,
        }
    }
}

/// Metadata of an action type, consumed by configuration tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDescriptor {
    /// Registry key
    pub type_name: &'static str,
    /// Short label
    pub label: &'static str,
    /// What the action does
    pub description: &'static str,
    /// Configurable settings
    pub form: Vec<FormField>,
}

struct Entry {
    descriptor: ActionDescriptor,
    factory: ActionFactory,
}

/// Registry of action types.
pub struct ActionRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl ActionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// A registry with the built-in `command` and `interval` actions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(CommandAction::descriptor(), CommandAction::create);
        registry.register(IntervalAction::descriptor(), IntervalAction::create);
        registry
    }

    /// Add (or replace) an action type.
    pub fn register(&mut self, descriptor: ActionDescriptor, factory: ActionFactory) {
        self.entries
            .insert(descriptor.type_name, Entry { descriptor, factory });
    }

    /// Whether `type_name` is known.
    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Known type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Metadata of every type, sorted by name.
    pub fn descriptors(&self) -> Vec<ActionDescriptor> {
        self.entries.values().map(|e| e.descriptor.clone()).collect()
    }

    /// Build an action of type `type_name`.
    pub fn create(
        &self,
        type_name: &str,
        settings: Settings,
        uuid: Uuid,
        name: impl Into<String>,
    ) -> DaemonResult<Box<dyn Action>> {
        let entry = self.entries.get(type_name).ok_or_else(|| {
            DaemonError::Config(format!(
                "Unknown action type: {}. Expected one of: {}",
                type_name,
                self.type_names().join(", ")
            ))
        })?;
        (entry.factory)(settings, uuid, name.into())
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
