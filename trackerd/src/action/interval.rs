//! Emits a fixed event on a timer. Handy as a synthetic check.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;
use tracker_domain::{timestamp_with_milliseconds, Settings};
use uuid::Uuid;

use super::registry::{ActionDescriptor, FieldKind, FormField};
use super::{Action, ActionContext};
use crate::error::{DaemonError, DaemonResult};

/// Periodic event source.
pub struct IntervalAction {
    uuid: Uuid,
    name: String,
    settings: Settings,
    period: Duration,
    template: Map<String, Value>,
}

impl IntervalAction {
    /// Registry metadata.
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor {
            type_name: "interval",
            label: "Interval",
            description: "Creates the same event at a fixed interval",
            form: vec![
                FormField::required("interval_secs", "Interval", FieldKind::Number, "Seconds between events"),
                FormField::required("event", "Event", FieldKind::Object, "Event properties to emit"),
            ],
        }
    }

    /// Build from settings.
    pub fn create(settings: Settings, uuid: Uuid, name: String) -> DaemonResult<Box<dyn Action>> {
        Ok(Box::new(Self::new(settings, uuid, name)?))
    }

    /// Validate settings and build.
    pub fn new(settings: Settings, uuid: Uuid, name: String) -> DaemonResult<Self> {
        let secs = settings.require_u64("interval_secs").map_err(DaemonError::settings)?;
        if secs == 0 {
            return Err(DaemonError::Settings("interval_secs must be at least 1".to_string()));
        }
        let template = settings
            .optional_object("event")
            .map_err(DaemonError::settings)?
            .cloned()
            .ok_or_else(|| DaemonError::Settings("Missing setting: event".to_string()))?;

        Ok(Self {
            uuid,
            name,
            settings,
            period: Duration::from_secs(secs),
            template,
        })
    }

    fn next_event(&self) -> Value {
        let mut event = self.template.clone();
        event.insert("timestamp".to_string(), Value::from(timestamp_with_milliseconds()));
        Value::Object(event)
    }
}

#[async_trait]
impl Action for IntervalAction {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn run(&self, ctx: ActionContext) -> DaemonResult<()> {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(()),
                _ = ticker.tick() => {},
            }

            if ctx.is_paused() {
                debug!("Paused, skipping tick");
                continue;
            }
            match ctx.emit(self.next_event()).await {
                Ok(()) => {},
                Err(DaemonError::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}
