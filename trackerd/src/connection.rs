//! Store connection: the single owner of the store handle.
//!
//! `StoreConnection` runs as one task. Every state transition happens inside
//! its select loop, so no two timer callbacks, commands or attempt outcomes
//! ever interleave and the in-process state needs no locks. Callers talk to
//! it through a cloneable `ConnectionHandle` (commands with oneshot replies)
//! and observe it through a `watch` channel and the status `EventBus`.
//!
//! # States
//!
//! ```text
//!                 config = None
//!        ┌──────────────────────────────► NoConfiguration
//!        │                                      │ config = Some
//!        │                                      ▼
//! Disconnected ──connect()──► Connecting ──lock acquired──► Connected
//!        ▲                        │ (retry loop)                │
//!        │                        │ cancelled                   │ disconnect()
//!        └────────────────────────┴─────── Disconnecting ◄──────┘
//! ```
//!
//! Connect attempts run in a spawned retry task tagged with a generation
//! number. Superseding an attempt (disconnect, config change) cancels its
//! token and bumps the generation, so a late success from an old attempt is
//! discarded instead of adopted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracker_domain::{timestamp_with_milliseconds, DbConfig, ProcessDetails};
use tracker_store::{StoreConnector, StoreHandle};
use uuid::Uuid;

use crate::component::{init_all, stop_all, DbComponent};
use crate::error::{ConnectError, DaemonError, DaemonResult};
use crate::event_bus::{EventBus, StatusEvent, StatusLevel};
use crate::instance_lock::{self, LockedStore};
use crate::retry::{retry, RetryPolicy, RetryScheduler};

// =============================================================================
// State & Settings
// =============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    NoConfiguration,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::NoConfiguration => write!(f, "no_configuration"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Timing of the connection's periodic work.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Period of the own-row heartbeat
    pub heartbeat: Duration,
    /// Period of the schema drift check
    pub schema_check: Duration,
    /// Running rows older than this are evicted on connect
    pub stale_after: Duration,
    /// Connect retry policy
    pub retry: RetryPolicy,
    /// Bound on each component's `stop_db()`; `None` waits forever
    pub component_stop_timeout: Option<Duration>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(3),
            schema_check: Duration::from_secs(15),
            stale_after: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            component_stop_timeout: None,
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

enum Command {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<DaemonResult<()>>),
    Reconnect(oneshot::Sender<DaemonResult<()>>),
    ConfigChanged(Option<DbConfig>, oneshot::Sender<DaemonResult<()>>),
    Register(Arc<dyn DbComponent>, oneshot::Sender<()>),
}

/// Cloneable client of a running `StoreConnection`.
///
/// Every method returns `DaemonError::Shutdown` once the connection task
/// has exited.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    schema_version: watch::Receiver<Option<i64>>,
    instance_uuid: Uuid,
}

impl ConnectionHandle {
    /// Id of this daemon instance in `daemon_info`.
    pub fn instance_uuid(&self) -> Uuid {
        self.instance_uuid
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Schema version captured by the last successful connect.
    pub fn startup_schema_version(&self) -> Option<i64> {
        *self.schema_version.borrow()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> DaemonResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| DaemonError::Shutdown)
    }

    /// Start connecting. A no-op while connecting or connected.
    pub async fn connect(&self) -> DaemonResult<()> {
        self.request(Command::Connect).await
    }

    /// Release the store: mark stopped, stop components, close.
    ///
    /// Calls are processed one after another, so a second call made while
    /// the first is in progress resolves after it, as a no-op.
    pub async fn disconnect(&self) -> DaemonResult<()> {
        self.request(Command::Disconnect).await?
    }

    /// Disconnect, then connect again.
    ///
    /// An error means the local handle could not be torn down; the
    /// connection task exits with the same error.
    pub async fn reconnect(&self) -> DaemonResult<()> {
        self.request(Command::Reconnect).await?
    }

    /// Apply new connection parameters (`None`: no valid configuration).
    pub async fn config_changed(&self, config: Option<DbConfig>) -> DaemonResult<()> {
        self.request(|reply| Command::ConfigChanged(config, reply)).await?
    }

    /// Register a dependent component.
    ///
    /// If the store is already connected the component is initialized
    /// right away. Components must not call back into this handle from
    /// `init_db`/`stop_db`.
    pub async fn register(&self, component: Arc<dyn DbComponent>) -> DaemonResult<()> {
        self.request(|reply| Command::Register(component, reply)).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> DaemonResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| DaemonError::Shutdown)?;
        response.await.map_err(|_| DaemonError::Shutdown)
    }
}

// =============================================================================
// Connection
// =============================================================================

struct AttemptOutcome {
    generation: u64,
    locked: LockedStore,
}

/// Owner of the store handle and its connect/heartbeat/schema state machine.
pub struct StoreConnection {
    connector: Arc<dyn StoreConnector>,
    settings: ConnectionSettings,
    details: ProcessDetails,
    config: Option<DbConfig>,
    store: Option<StoreHandle>,
    components: Vec<Arc<dyn DbComponent>>,
    retry: RetryScheduler,
    generation: u64,
    startup_schema: Option<i64>,
    reported_schema: Option<i64>,
    bus: Arc<EventBus>,
    state_tx: watch::Sender<ConnectionState>,
    schema_tx: watch::Sender<Option<i64>>,
    commands: mpsc::Receiver<Command>,
    outcomes_tx: mpsc::UnboundedSender<AttemptOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<AttemptOutcome>,
}

impl StoreConnection {
    /// Create a connection and its handle.
    ///
    /// With `config` set, `run()` starts connecting immediately; without
    /// it the connection waits in `NoConfiguration`.
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        settings: ConnectionSettings,
        details: ProcessDetails,
        config: Option<DbConfig>,
        bus: Arc<EventBus>,
    ) -> (Self, ConnectionHandle) {
        let (commands_tx, commands) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (schema_tx, schema_rx) = watch::channel(None);
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        let handle = ConnectionHandle {
            commands: commands_tx,
            state: state_rx,
            schema_version: schema_rx,
            instance_uuid: details.instance_uuid(),
        };

        let connection = Self {
            connector,
            retry: RetryScheduler::new(settings.retry.clone()),
            settings,
            details,
            config,
            store: None,
            components: Vec::new(),
            generation: 0,
            startup_schema: None,
            reported_schema: None,
            bus,
            state_tx,
            schema_tx,
            commands,
            outcomes_tx,
            outcomes_rx,
        };

        (connection, handle)
    }

    /// Run until `shutdown` is cancelled or every handle is dropped.
    ///
    /// Always ends with a full disconnect. Returns `Err` only for fatal
    /// local failures (a disconnect that failed during reconnect).
    pub async fn run(mut self, shutdown: CancellationToken) -> DaemonResult<()> {
        info!(
            instance_uuid = %self.details.instance_uuid(),
            hostname = self.details.hostname(),
            pid = self.details.pid(),
            "Store connection started"
        );

        if self.config.is_some() {
            self.connect();
        } else {
            self.enter_no_configuration();
        }

        let mut heartbeat = periodic(self.settings.heartbeat);
        let mut schema_check = periodic(self.settings.schema_check);

        let outcome = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.handle_command(command).await {
                            break Err(e);
                        }
                    },
                    None => break Ok(()),
                },

                Some(attempt) = self.outcomes_rx.recv() => self.adopt(attempt).await,

                _ = heartbeat.tick() => {
                    if let Err(e) = self.heartbeat().await {
                        break Err(e);
                    }
                },

                _ = schema_check.tick() => self.check_schema().await,
            }
        };

        if let Err(e) = &outcome {
            error!(error = %e, "Store connection failed fatally");
        }

        self.retry.reset();
        let closed = self.disconnect().await;
        info!("Store connection stopped");
        outcome.and(closed)
    }

    async fn handle_command(&mut self, command: Command) -> DaemonResult<()> {
        match command {
            Command::Connect(reply) => {
                self.connect();
                let _ = reply.send(());
            },
            Command::Disconnect(reply) => {
                let result = self.disconnect().await;
                let _ = reply.send(result);
            },
            Command::Reconnect(reply) => {
                let result = self.reconnect().await;
                return escalate(result, reply);
            },
            Command::ConfigChanged(config, reply) => {
                let result = self.config_changed(config).await;
                return escalate(result, reply);
            },
            Command::Register(component, reply) => {
                if let (ConnectionState::Connected, Some(store)) = (self.state(), &self.store) {
                    init_all(std::slice::from_ref(&component), store).await;
                }
                debug!(component = component.name(), "Component registered");
                self.components.push(component);
                let _ = reply.send(());
            },
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Connect
    // -------------------------------------------------------------------------

    fn connect(&mut self) {
        let state = self.state();
        if matches!(state, ConnectionState::Connected | ConnectionState::Connecting) {
            debug!(%state, "Connect ignored");
            return;
        }
        let Some(config) = self.config.clone() else {
            self.enter_no_configuration();
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        self.set_state(ConnectionState::Connecting);
        self.emit(StatusEvent::state("connecting", StatusLevel::Info));

        let token = self.retry.arm();
        let policy = self.retry.policy().clone();
        let connector = self.connector.clone();
        let details = self.details.clone();
        let stale_after = self.settings.stale_after;
        let bus = self.bus.clone();
        let outcomes = self.outcomes_tx.clone();
        let span = info_span!("connect", host = %config.host, database = %config.database, generation);

        tokio::spawn(
            async move {
                let locked = retry(
                    &policy,
                    &token,
                    |attempt| {
                        let connector = connector.clone();
                        let config = config.clone();
                        let details = details.clone();
                        async move {
                            debug!(attempt, "Connect attempt");
                            instance_lock::acquire(connector.as_ref(), &config, &details, stale_after)
                                .await
                        }
                    },
                    |failures, err: &ConnectError, delay| {
                        warn!(
                            attempt = failures,
                            error = %err,
                            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Connect attempt failed"
                        );
                        bus.send(StatusEvent::state(err.status_message(), StatusLevel::Error));
                    },
                )
                .await;

                match locked {
                    Some(locked) => {
                        if let Err(rejected) = outcomes.send(AttemptOutcome { generation, locked }) {
                            // connection task is gone, no later attempt can own the row
                            let locked = rejected.0.locked;
                            instance_lock::release(
                                locked.store.as_ref(),
                                details.instance_uuid(),
                                timestamp_with_milliseconds(),
                            )
                            .await;
                            discard(locked).await;
                        }
                    },
                    None => debug!("Connect attempt cancelled"),
                }
            }
            .instrument(span),
        );
    }

    async fn adopt(&mut self, attempt: AttemptOutcome) {
        let AttemptOutcome { generation, locked } = attempt;
        if generation != self.generation || self.state() != ConnectionState::Connecting {
            debug!(generation, current = self.generation, "Discarding superseded connection");
            discard(locked).await;
            return;
        }

        self.retry.finish();
        let LockedStore {
            store,
            schema_version,
        } = locked;

        self.details.set_schema_version(schema_version);
        self.startup_schema = Some(schema_version);
        self.reported_schema = Some(schema_version);
        self.schema_tx.send_replace(Some(schema_version));
        self.store = Some(store.clone());
        self.set_state(ConnectionState::Connected);

        info!(
            instance_uuid = %self.details.instance_uuid(),
            schema_version,
            "Connected to store"
        );
        self.emit(StatusEvent::state("connected", StatusLevel::Info));

        init_all(&self.components, &store).await;
    }

    // -------------------------------------------------------------------------
    // Disconnect
    // -------------------------------------------------------------------------

    async fn disconnect(&mut self) -> DaemonResult<()> {
        if self.retry.is_pending() || self.state() == ConnectionState::Connecting {
            self.retry.reset();
            self.generation += 1;
            if self.store.is_none() {
                debug!("Pending connect cancelled");
                self.set_state(ConnectionState::Disconnected);
            }
        }

        let Some(store) = self.store.clone() else {
            return Ok(());
        };

        self.set_state(ConnectionState::Disconnecting);
        self.emit(StatusEvent::state("disconnecting", StatusLevel::Info));

        instance_lock::release(
            store.as_ref(),
            self.details.instance_uuid(),
            timestamp_with_milliseconds(),
        )
        .await;

        let failures = stop_all(&self.components, self.settings.component_stop_timeout).await;
        if !failures.is_empty() {
            warn!(failed = failures.len(), "Closing store with components that failed to stop");
        }

        self.store = None;
        let closed = store.close().await;
        drop(store);
        self.set_state(ConnectionState::Disconnected);

        match closed {
            Ok(()) => {
                info!("Disconnected from store");
                self.emit(StatusEvent::state("disconnected", StatusLevel::Info));
                Ok(())
            },
            Err(e) => {
                error!(error = %e, "Failed to close store handle");
                self.emit(StatusEvent::state("disconnect failed", StatusLevel::Error));
                Err(DaemonError::LocalDisconnect(e.to_string()))
            },
        }
    }

    async fn reconnect(&mut self) -> DaemonResult<()> {
        info!("Reconnecting");
        self.disconnect().await?;
        self.connect();
        Ok(())
    }

    async fn config_changed(&mut self, config: Option<DbConfig>) -> DaemonResult<()> {
        self.retry.reset();
        self.disconnect().await?;
        self.config = config;

        match &self.config {
            None => self.enter_no_configuration(),
            Some(config) => {
                info!(host = %config.host, database = %config.database, "Configuration loaded");
                self.emit(StatusEvent::state("configuration loaded", StatusLevel::Info));
                self.set_state(ConnectionState::Disconnected);
                self.connect();
            },
        }
        Ok(())
    }

    fn enter_no_configuration(&mut self) {
        self.set_state(ConnectionState::NoConfiguration);
        self.emit(StatusEvent::state("no configuration", StatusLevel::Error));
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    async fn heartbeat(&mut self) -> DaemonResult<()> {
        if self.state() != ConnectionState::Connected || self.retry.is_pending() {
            return Ok(());
        }
        let Some(store) = self.store.clone() else {
            return Ok(());
        };

        let written =
            instance_lock::write_heartbeat(store.as_ref(), &self.details, timestamp_with_milliseconds())
                .await;
        drop(store);

        match written {
            Ok(()) => {
                debug!("Heartbeat written");
                Ok(())
            },
            Err(e) => {
                warn!(error = %e, connection_lost = e.is_connection(), "Heartbeat failed");
                self.emit(StatusEvent::state("heartbeat failed", StatusLevel::Warning));
                self.reconnect().await
            },
        }
    }

    async fn check_schema(&mut self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        let (Some(store), Some(startup)) = (self.store.clone(), self.startup_schema) else {
            return;
        };

        match store.schema().schema_version().await {
            Ok(current) if Some(current) == self.reported_schema => {},
            Ok(current) => {
                self.reported_schema = Some(current);
                if current != startup {
                    self.emit(StatusEvent::SchemaChange {
                        old: startup,
                        new: current,
                    });
                } else {
                    info!(schema_version = current, "Schema version is back at startup version");
                }
            },
            Err(e) => warn!(error = %e, "Schema version check failed"),
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    fn emit(&self, event: StatusEvent) {
        self.bus.send(event);
    }
}

/// Interval whose first tick fires one period from now.
fn periodic(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Close a handle that won the lock but will not be used.
///
/// The row it wrote carries our instance id, which the attempt that
/// superseded it shares; that row is left alone. The next successful
/// attempt sweeps it as own residue.
async fn discard(locked: LockedStore) {
    if let Err(e) = locked.store.close().await {
        warn!(error = %e, "Failed to close discarded store handle");
    }
}

fn escalate(result: DaemonResult<()>, reply: oneshot::Sender<DaemonResult<()>>) -> DaemonResult<()> {
    match result {
        Ok(()) => {
            let _ = reply.send(Ok(()));
            Ok(())
        },
        Err(e) => {
            let _ = reply.send(Err(DaemonError::LocalDisconnect(e.to_string())));
            Err(e)
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_store::{MemoryConnector, MemoryStore};
    use tracker_testkit::db_config;

    fn start(
        store: Arc<MemoryStore>,
        config: Option<DbConfig>,
    ) -> (ConnectionHandle, Arc<EventBus>, CancellationToken, tokio::task::JoinHandle<DaemonResult<()>>) {
        let bus = Arc::new(EventBus::new(64));
        let connector = Arc::new(MemoryConnector::new(store));
        let (connection, handle) = StoreConnection::new(
            connector,
            ConnectionSettings::default(),
            ProcessDetails::new("test-host", 1, 0),
            config,
            bus.clone(),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(connection.run(shutdown.clone()));
        (handle, bus, shutdown, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_and_writes_own_row() {
        let store = Arc::new(MemoryStore::with_schema(3));
        let (handle, _bus, shutdown, task) = start(store.clone(), Some(db_config("a")));

        handle.wait_for_state(ConnectionState::Connected).await.unwrap();

        let row = store.instance(handle.instance_uuid()).unwrap();
        assert_eq!(row.schema_version, Some(3));
        assert_eq!(handle.startup_schema_version(), Some(3));

        shutdown.cancel();
        task.await.unwrap().unwrap();
        assert!(store.instance(handle.instance_uuid()).unwrap().ts_stopped.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_config_waits_in_no_configuration() {
        let store = Arc::new(MemoryStore::with_schema(1));
        let (handle, _bus, shutdown, task) = start(store, None);

        handle.wait_for_state(ConnectionState::NoConfiguration).await.unwrap();
        handle.connect().await.unwrap();
        assert_eq!(handle.state(), ConnectionState::NoConfiguration);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_schema_keeps_retrying() {
        let store = Arc::new(MemoryStore::new());
        let (handle, bus, shutdown, task) = start(store.clone(), None);
        let mut events = bus.subscribe();

        handle.config_changed(Some(db_config("a"))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state(), ConnectionState::Connecting);
        assert!(events
            .drain()
            .contains(&StatusEvent::state("no schema", StatusLevel::Error)));

        store.set_schema_version(Some(1));
        handle.wait_for_state(ConnectionState::Connected).await.unwrap();

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_cleared_disconnects() {
        let store = Arc::new(MemoryStore::with_schema(1));
        let (handle, bus, shutdown, task) = start(store.clone(), Some(db_config("a")));
        handle.wait_for_state(ConnectionState::Connected).await.unwrap();
        let mut events = bus.subscribe();

        handle.config_changed(None).await.unwrap();

        assert_eq!(handle.state(), ConnectionState::NoConfiguration);
        assert_eq!(store.close_count(), 1);
        assert!(events
            .drain()
            .contains(&StatusEvent::state("no configuration", StatusLevel::Error)));

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_of_superseded_attempt_keeps_lock() {
        let store = Arc::new(MemoryStore::with_schema(1));
        let connector = Arc::new(MemoryConnector::new(store.clone()));
        let details = ProcessDetails::new("test-host", 1, 0);
        let stale_after = ConnectionSettings::default().stale_after;
        let (mut connection, _handle) = StoreConnection::new(
            connector.clone(),
            ConnectionSettings::default(),
            details.clone(),
            Some(db_config("b")),
            Arc::new(EventBus::new(16)),
        );

        // attempt for "a" wins the lock, then "b" supersedes it and wins again
        let locked_a = instance_lock::acquire(connector.as_ref(), &db_config("a"), &details, stale_after)
            .await
            .unwrap();
        let locked_b = instance_lock::acquire(connector.as_ref(), &db_config("b"), &details, stale_after)
            .await
            .unwrap();
        connection.generation = 2;
        connection.set_state(ConnectionState::Connecting);
        connection
            .adopt(AttemptOutcome {
                generation: 2,
                locked: locked_b,
            })
            .await;
        connection
            .adopt(AttemptOutcome {
                generation: 1,
                locked: locked_a,
            })
            .await;

        assert_eq!(connection.state(), ConnectionState::Connected);
        let row = store.instance(details.instance_uuid()).unwrap();
        assert!(row.ts_stopped.is_none());
        assert_eq!(store.close_count(), 1);

        let other = ProcessDetails::new("other-host", 2, 0);
        let second = instance_lock::acquire(connector.as_ref(), &db_config("b"), &other, stale_after).await;
        assert!(matches!(second, Err(ConnectError::LockConflict { active: 1 })));

        connection.disconnect().await.unwrap();
        assert!(store.instance(details.instance_uuid()).unwrap().ts_stopped.is_some());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::NoConfiguration.to_string(), "no_configuration");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }
}
