//! Actions: long-running, lifecycle-controlled event sources.
//!
//! An action only knows how to run. Lifecycle (start/stop/pause/resume)
//! belongs to the `ActionRuntime`, and the descriptive metadata shown to
//! configuration tooling lives in the `ActionRegistry`.
//!
//! # Contract
//!
//! - `run(ctx)` executes until `ctx` is cancelled or the source ends
//! - events go out through `ctx.emit()`, which waits while paused
//! - logs go to the span in `ctx.span()`, entered by the runtime

mod command;
mod interval;
mod registry;

pub use command::CommandAction;
pub use interval::IntervalAction;
pub use registry::{ActionDescriptor, ActionFactory, ActionRegistry, FieldKind, FormField};

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracker_domain::Settings;
use uuid::Uuid;

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Created,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionState::Created => write!(f, "created"),
            ActionState::Running => write!(f, "running"),
            ActionState::Paused => write!(f, "paused"),
            ActionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Result of a lifecycle request.
///
/// A request that does not apply in the current state is not an error;
/// it is reported with `applied == false` and leaves the state unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// State after the request
    pub state: ActionState,
    /// Whether the request changed anything
    pub applied: bool,
}

impl Transition {
    /// The request moved the action into `state`.
    pub fn applied(state: ActionState) -> Self {
        Self {
            state,
            applied: true,
        }
    }

    /// The request was a no-op in `state`.
    pub fn ignored(state: ActionState) -> Self {
        Self {
            state,
            applied: false,
        }
    }
}

// =============================================================================
// Action
// =============================================================================

/// A pluggable event source.
#[async_trait]
pub trait Action: Send + Sync {
    /// Instance id.
    fn uuid(&self) -> Uuid;

    /// Human name.
    fn name(&self) -> &str;

    /// Settings this instance was built from.
    fn settings(&self) -> &Settings;

    /// Run until cancelled. Returning `Ok` means the source ended.
    async fn run(&self, ctx: ActionContext) -> DaemonResult<()>;
}

/// An event produced by an action, before modifiers run.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    /// Producing action
    pub action_uuid: Uuid,
    /// Raw event object
    pub event: Value,
}

/// Everything a running action may use.
pub struct ActionContext {
    uuid: Uuid,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
    events: mpsc::Sender<EmittedEvent>,
    span: tracing::Span,
}

impl ActionContext {
    /// Build a context. The runtime does this when it starts an action.
    pub fn new(
        uuid: Uuid,
        cancel: CancellationToken,
        paused: watch::Receiver<bool>,
        events: mpsc::Sender<EmittedEvent>,
        span: tracing::Span,
    ) -> Self {
        Self {
            uuid,
            cancel,
            paused,
            events,
            span,
        }
    }

    /// Log sink for this action.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Resolves when the action is asked to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Whether the action was asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the action is currently paused.
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Wait while paused. Returns `Err(Shutdown)` if cancelled meanwhile.
    pub async fn wait_while_paused(&self) -> DaemonResult<()> {
        let mut paused = self.paused.clone();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DaemonError::Shutdown),
            resumed = paused.wait_for(|paused| !*paused) => {
                resumed.map(|_| ()).map_err(|_| DaemonError::Shutdown)
            },
        }
    }

    /// Hand an event to the pipeline, waiting first while paused.
    pub async fn emit(&self, event: Value) -> DaemonResult<()> {
        self.wait_while_paused().await?;
        let emitted = EmittedEvent {
            action_uuid: self.uuid,
            event,
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DaemonError::Shutdown),
            sent = self.events.send(emitted) => sent.map_err(|_| DaemonError::Shutdown),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
