//! Action runtime: owns the configured actions and drives their lifecycle.
//!
//! The runtime is a dependent component of the store connection. While the
//! store is connected it runs a consumer task that passes every emitted
//! event through the modifier pipeline and records it as an issue. On
//! `init_db` the consumer is started first, then every enabled action. On
//! `stop_db` every action is cancelled and awaited before the consumer
//! drains its queue and drops the store handle.
//!
//! Lifecycle requests (`start`, `stop`, `pause`, `resume`) are safe from any
//! state: a request that does not apply returns an ignored `Transition`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracker_domain::timestamp_with_milliseconds;
use tracker_store::StoreHandle;
use uuid::Uuid;

use crate::action::{Action, ActionContext, ActionState, EmittedEvent, Transition};
use crate::component::DbComponent;
use crate::error::{DaemonError, DaemonResult};
use crate::modifier::ModifierPipeline;

/// Capacity of the queue between actions and the issue writer.
const EVENT_QUEUE: usize = 256;

/// One row of `ActionRuntime::summaries`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSummary {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: ActionState,
}

struct RunningTask {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct ManagedAction {
    action: Arc<dyn Action>,
    type_name: String,
    state: Arc<watch::Sender<ActionState>>,
    enabled: bool,
    paused: bool,
    task: Option<RunningTask>,
}

impl ManagedAction {
    fn state(&self) -> ActionState {
        *self.state.borrow()
    }
}

struct Session {
    events: mpsc::Sender<EmittedEvent>,
    consumer: JoinHandle<()>,
}

#[derive(Default)]
struct RuntimeInner {
    actions: Vec<ManagedAction>,
    session: Option<Session>,
}

impl RuntimeInner {
    fn find_mut(&mut self, uuid: Uuid) -> DaemonResult<&mut ManagedAction> {
        self.actions
            .iter_mut()
            .find(|managed| managed.action.uuid() == uuid)
            .ok_or(DaemonError::ActionNotFound(uuid))
    }
}

/// Owner of every configured action.
pub struct ActionRuntime {
    inner: Mutex<RuntimeInner>,
    pipeline: Arc<ModifierPipeline>,
}

impl ActionRuntime {
    /// Create a runtime whose events pass through `pipeline`.
    pub fn new(pipeline: ModifierPipeline) -> Self {
        Self {
            inner: Mutex::new(RuntimeInner::default()),
            pipeline: Arc::new(pipeline),
        }
    }

    /// The modifier pipeline applied to every event.
    pub fn pipeline(&self) -> &ModifierPipeline {
        &self.pipeline
    }

    /// Add an action. It starts with the next connection, or right away if
    /// the store is connected.
    pub async fn add(&self, type_name: impl Into<String>, action: Box<dyn Action>) -> DaemonResult<()> {
        let mut inner = self.inner.lock().await;
        let uuid = action.uuid();
        if inner.actions.iter().any(|managed| managed.action.uuid() == uuid) {
            return Err(DaemonError::Config(format!("Duplicate action uuid: {}", uuid)));
        }

        let (state, _) = watch::channel(ActionState::Created);
        let mut managed = ManagedAction {
            action: Arc::from(action),
            type_name: type_name.into(),
            state: Arc::new(state),
            enabled: true,
            paused: false,
            task: None,
        };
        debug!(action_uuid = %uuid, action_name = managed.action.name(), "Action added");

        if let Some(session) = &inner.session {
            spawn_action(&mut managed, session);
        }
        inner.actions.push(managed);
        Ok(())
    }

    /// Number of actions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.actions.len()
    }

    /// Whether no action is configured.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.actions.is_empty()
    }

    /// Current state of an action.
    pub async fn state_of(&self, uuid: Uuid) -> DaemonResult<ActionState> {
        let mut inner = self.inner.lock().await;
        Ok(inner.find_mut(uuid)?.state())
    }

    /// Watch the state of an action.
    pub async fn subscribe(&self, uuid: Uuid) -> DaemonResult<watch::Receiver<ActionState>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.find_mut(uuid)?.state.subscribe())
    }

    /// Uuid, name, type and state of every action, in insertion order.
    pub async fn summaries(&self) -> Vec<ActionSummary> {
        let inner = self.inner.lock().await;
        inner
            .actions
            .iter()
            .map(|managed| ActionSummary {
                uuid: managed.action.uuid(),
                name: managed.action.name().to_string(),
                type_name: managed.type_name.clone(),
                state: managed.state(),
            })
            .collect()
    }

    /// Start a created or stopped action.
    ///
    /// While the store is disconnected the action is only marked to start
    /// with the next connection.
    pub async fn start(&self, uuid: Uuid) -> DaemonResult<Transition> {
        let mut inner = self.inner.lock().await;
        let RuntimeInner { actions, session } = &mut *inner;
        let managed = actions
            .iter_mut()
            .find(|managed| managed.action.uuid() == uuid)
            .ok_or(DaemonError::ActionNotFound(uuid))?;

        let state = managed.state();
        if !matches!(state, ActionState::Created | ActionState::Stopped) {
            warn!(action_uuid = %uuid, %state, "Start ignored");
            return Ok(Transition::ignored(state));
        }

        managed.enabled = true;
        managed.paused = false;
        match session {
            Some(session) => {
                spawn_action(managed, session);
                Ok(Transition::applied(ActionState::Running))
            },
            None => {
                debug!(action_uuid = %uuid, "Store not connected, action will start on connect");
                Ok(Transition::ignored(state))
            },
        }
    }

    /// Stop a running or paused action and wait for it to finish.
    ///
    /// While the store is disconnected this cancels a pending start.
    pub async fn stop(&self, uuid: Uuid) -> DaemonResult<Transition> {
        let mut inner = self.inner.lock().await;
        let connected = inner.session.is_some();
        let managed = inner.find_mut(uuid)?;

        let state = managed.state();
        if matches!(state, ActionState::Running | ActionState::Paused) {
            managed.enabled = false;
            managed.paused = false;
            halt(managed).await;
            return Ok(Transition::applied(managed.state()));
        }
        if managed.enabled && !connected {
            managed.enabled = false;
            managed.paused = false;
            managed.state.send_replace(ActionState::Stopped);
            debug!(action_uuid = %uuid, "Pending start cancelled");
            return Ok(Transition::applied(ActionState::Stopped));
        }

        warn!(action_uuid = %uuid, %state, "Stop ignored");
        Ok(Transition::ignored(state))
    }

    /// Pause a running action. Its `emit()` calls wait until resumed.
    pub async fn pause(&self, uuid: Uuid) -> DaemonResult<Transition> {
        self.set_paused(uuid, true).await
    }

    /// Resume a paused action.
    pub async fn resume(&self, uuid: Uuid) -> DaemonResult<Transition> {
        self.set_paused(uuid, false).await
    }

    async fn set_paused(&self, uuid: Uuid, paused: bool) -> DaemonResult<Transition> {
        let mut inner = self.inner.lock().await;
        let managed = inner.find_mut(uuid)?;

        let (from, to) = if paused {
            (ActionState::Running, ActionState::Paused)
        } else {
            (ActionState::Paused, ActionState::Running)
        };
        let state = managed.state();
        let Some(task) = managed.task.as_ref().filter(|_| state == from) else {
            warn!(action_uuid = %uuid, %state, requested = %to, "Lifecycle request ignored");
            return Ok(Transition::ignored(state));
        };

        task.paused.send_replace(paused);
        managed.paused = paused;
        managed.state.send_replace(to);
        info!(action_uuid = %uuid, state = %to, "Action state changed");
        Ok(Transition::applied(to))
    }
}

#[async_trait]
impl DbComponent for ActionRuntime {
    fn name(&self) -> &str {
        "actions"
    }

    async fn init_db(&self, store: StoreHandle) -> DaemonResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.session.is_some() {
            return Err(DaemonError::Lifecycle("action runtime already initialized".to_string()));
        }

        match store.issues().count().await {
            Ok(issues) => debug!(issues, "Known issues"),
            Err(e) => warn!(error = %e, "Failed to count issues"),
        }

        let (events, receiver) = mpsc::channel(EVENT_QUEUE);
        let consumer = tokio::spawn(
            consume(receiver, store, self.pipeline.clone()).instrument(info_span!("ingest")),
        );
        let session = Session { events, consumer };

        let mut started = 0usize;
        for managed in inner.actions.iter_mut().filter(|managed| managed.enabled) {
            spawn_action(managed, &session);
            started += 1;
        }
        inner.session = Some(session);

        info!(started, "Actions started");
        Ok(())
    }

    async fn stop_db(&self) -> DaemonResult<()> {
        let mut inner = self.inner.lock().await;
        for managed in inner.actions.iter_mut() {
            halt(managed).await;
        }

        let Some(Session { events, consumer }) = inner.session.take() else {
            return Ok(());
        };
        drop(events);
        consumer
            .await
            .map_err(|e| DaemonError::Lifecycle(format!("ingest task failed: {}", e)))?;

        info!("Actions stopped");
        Ok(())
    }
}

fn spawn_action(managed: &mut ManagedAction, session: &Session) {
    let action = managed.action.clone();
    let uuid = action.uuid();
    let cancel = CancellationToken::new();
    let (paused, paused_rx) = watch::channel(managed.paused);
    let span = info_span!("action", action_uuid = %uuid, action_name = %action.name());
    let ctx = ActionContext::new(uuid, cancel.clone(), paused_rx, session.events.clone(), span.clone());
    let state = managed.state.clone();

    state.send_replace(if managed.paused {
        ActionState::Paused
    } else {
        ActionState::Running
    });
    let handle = tokio::spawn(
        async move {
            info!("Action started");
            match action.run(ctx).await {
                Ok(()) | Err(DaemonError::Shutdown) => info!("Action finished"),
                Err(e) => error!(error = %e, "Action failed"),
            }
            state.send_replace(ActionState::Stopped);
        }
        .instrument(span),
    );

    managed.task = Some(RunningTask {
        cancel,
        paused,
        handle,
    });
}

/// Cancel an action's task and wait for it.
async fn halt(managed: &mut ManagedAction) {
    let Some(task) = managed.task.take() else {
        return;
    };
    task.cancel.cancel();
    if let Err(e) = task.handle.await {
        error!(action_uuid = %managed.action.uuid(), error = %e, "Action task panicked");
    }
    managed.state.send_replace(ActionState::Stopped);
}

/// Apply modifiers to each event and record it as an issue.
async fn consume(
    mut events: mpsc::Receiver<EmittedEvent>,
    store: StoreHandle,
    pipeline: Arc<ModifierPipeline>,
) {
    while let Some(EmittedEvent { action_uuid, mut event }) = events.recv().await {
        if let Err(e) = pipeline.apply(&mut event) {
            warn!(%action_uuid, error = %e, "Event dropped, modifier failed");
            continue;
        }
        match store.issues().record_event(&event, timestamp_with_milliseconds()).await {
            Ok(issue) => debug!(
                %action_uuid,
                issue_uuid = %issue.uuid,
                event_count = issue.event_count,
                "Event recorded"
            ),
            Err(e) => warn!(%action_uuid, error = %e, "Failed to record event"),
        }
    }
    debug!("Event queue closed");
}

// =============================================================================
// Tests
// =============================================================================
