//! Pipeline definition file: which actions run and which modifiers apply.
//!
//! ```json
//! {
//!   "actions":   [ { "uuid": "…", "name": "ticker", "type": "interval", "settings": { … } } ],
//!   "modifiers": [ { "property": "host_name", "type": "lower_case", "settings": { … } } ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracker_domain::Settings;
use uuid::Uuid;

use crate::action::{Action, ActionRegistry};
use crate::error::{DaemonError, DaemonResult};
use crate::modifier::{ModifierPipeline, ModifierRegistry};

/// One configured action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Instance id; generated when omitted
    #[serde(default = "Uuid::now_v7")]
    pub uuid: Uuid,
    /// Human name
    pub name: String,
    /// Registry type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Type-specific settings
    #[serde(default)]
    pub settings: Settings,
}

/// One configured modifier step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierDefinition {
    /// Dotted path the step reads and writes
    pub property: String,
    /// Registry type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Type-specific settings
    #[serde(default)]
    pub settings: Settings,
}

/// Parsed pipeline file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    #[serde(default)]
    pub modifiers: Vec<ModifierDefinition>,
}

/// Actions and pipeline built from a definition.
pub struct BuiltPipeline {
    /// `(type name, action)` in declared order
    pub actions: Vec<(String, Box<dyn Action>)>,
    /// Modifier steps in declared order
    pub modifiers: ModifierPipeline,
}

impl PipelineDefinition {
    /// Read and parse a definition file.
    pub fn load(path: &Path) -> DaemonResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DaemonError::Config(format!("Cannot read pipeline file {}: {}", path.display(), e))
        })?;
        let definition = Self::from_json(&raw).map_err(|e| {
            DaemonError::Config(format!("Invalid pipeline file {}: {}", path.display(), e))
        })?;
        info!(
            path = %path.display(),
            actions = definition.actions.len(),
            modifiers = definition.modifiers.len(),
            "Pipeline file loaded"
        );
        Ok(definition)
    }

    /// Parse a definition document.
    pub fn from_json(json: &str) -> DaemonResult<Self> {
        serde_json::from_str(json).map_err(|e| DaemonError::Config(e.to_string()))
    }

    /// Instantiate every action and modifier through the registries.
    ///
    /// Fails on the first unknown type or invalid settings.
    pub fn build(
        &self,
        actions: &ActionRegistry,
        modifiers: &ModifierRegistry,
    ) -> DaemonResult<BuiltPipeline> {
        let mut built_actions = Vec::with_capacity(self.actions.len());
        for definition in &self.actions {
            let action = actions
                .create(
                    &definition.type_name,
                    definition.settings.clone(),
                    definition.uuid,
                    definition.name.clone(),
                )
                .map_err(|e| DaemonError::Config(format!("action {}: {}", definition.name, e)))?;
            built_actions.push((definition.type_name.clone(), action));
        }

        let mut pipeline = ModifierPipeline::new();
        for definition in &self.modifiers {
            pipeline
                .push_from_registry(
                    modifiers,
                    definition.property.clone(),
                    &definition.type_name,
                    definition.settings.clone(),
                )
                .map_err(|e| DaemonError::Config(format!("modifier on {}: {}", definition.property, e)))?;
        }

        Ok(BuiltPipeline {
            actions: built_actions,
            modifiers: pipeline,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
