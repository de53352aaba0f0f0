//! Ordered chain of modifiers over one working record.

use serde_json::Value;
use tracing::trace;
use tracker_domain::{get_specific_value, set_specific_value, Settings};

use super::{Modifier, ModifierRegistry};
use crate::error::{DaemonError, DaemonResult};

/// One configured step: which property to rewrite and how.
pub struct ModifierStep {
    /// Dotted path read and written by this step
    pub property: String,
    /// Registry type name, for descriptions
    pub type_name: String,
    /// The transform
    pub modifier: Box<dyn Modifier>,
}

/// Modifiers applied strictly in declared order.
///
/// Steps share the same record, so later steps see what earlier ones wrote.
#[derive(Default)]
pub struct ModifierPipeline {
    steps: Vec<ModifierStep>,
}

impl ModifierPipeline {
    /// An empty pipeline (events pass through unchanged).
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step.
    pub fn push(
        &mut self,
        property: impl Into<String>,
        type_name: impl Into<String>,
        modifier: Box<dyn Modifier>,
    ) {
        self.steps.push(ModifierStep {
            property: property.into(),
            type_name: type_name.into(),
            modifier,
        });
    }

    /// Append a step built from the registry.
    pub fn push_from_registry(
        &mut self,
        registry: &ModifierRegistry,
        property: impl Into<String>,
        type_name: &str,
        settings: Settings,
    ) -> DaemonResult<()> {
        let modifier = registry.create(type_name, settings)?;
        self.push(property, type_name, modifier);
        Ok(())
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step against `event` in place.
    ///
    /// A step whose property is absent or null is skipped without calling
    /// the modifier. A step that yields no value leaves the property as is.
    pub fn apply(&self, event: &mut Value) -> DaemonResult<()> {
        for step in &self.steps {
            if get_specific_value(event, &step.property).is_none() {
                trace!(property = %step.property, modifier = %step.type_name, "Property is null, skipped");
                continue;
            }
            let transformed = step.modifier.transform(event, &step.property).map_err(|e| {
                DaemonError::Modifier(format!("{} on {}: {}", step.type_name, step.property, e))
            })?;
            if let Some(value) = transformed {
                set_specific_value(event, &step.property, value)?;
            }
        }
        Ok(())
    }

    /// Run the pipeline on a copy of `event`.
    pub fn transformed(&self, event: &Value) -> DaemonResult<Value> {
        let mut working = event.clone();
        self.apply(&mut working)?;
        Ok(working)
    }

    /// One line per step, for diagnostics.
    pub fn describe(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| match step.modifier.instance_description() {
                Some(description) => format!("{}: {} ({})", step.property, step.type_name, description),
                None => format!("{}: {}", step.property, step.type_name),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline(steps: &[(&str, &str, Settings)]) -> ModifierPipeline {
        let registry = ModifierRegistry::with_builtins();
        let mut pipeline = ModifierPipeline::new();
        for (property, type_name, settings) in steps {
            pipeline
                .push_from_registry(&registry, *property, type_name, settings.clone())
                .unwrap();
        }
        pipeline
    }

    #[test]
    fn test_steps_run_in_declared_order() {
        let pipeline = pipeline(&[
            ("host_name", "shorten_hostname", Settings::new()),
            ("host_name", "upper_case", Settings::new()),
            (
                "host_name",
                "map_lookup",
                Settings::new().with("map", json!({ "WEB1": "frontend" })),
            ),
        ]);

        let result = pipeline.transformed(&json!({ "host_name": "web1.example.com" })).unwrap();

        assert_eq!(result["host_name"], "frontend");
    }

    #[test]
    fn test_nested_property_is_rewritten_in_place() {
        let pipeline = pipeline(&[("attributes.env", "lower_case", Settings::new())]);
        let mut event = json!({ "attributes": { "env": "PROD", "team": "OPS" } });

        pipeline.apply(&mut event).unwrap();

        assert_eq!(event, json!({ "attributes": { "env": "prod", "team": "OPS" } }));
    }

    #[test]
    fn test_describe_lists_steps() {
        let pipeline = pipeline(&[
            ("message", "trim", Settings::new()),
            ("severity", "set_value", Settings::new().with("value", "critical")),
        ]);

        assert_eq!(
            pipeline.describe(),
            vec![
                "message: trim".to_string(),
                "severity: set_value (Set to 'critical')".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_pipeline_passes_through() {
        let event = json!({ "message": "x" });

        assert_eq!(ModifierPipeline::new().transformed(&event).unwrap(), event);
        assert!(ModifierPipeline::new().is_empty());
    }
}
