//! Supervisor: main runtime orchestrator.
//!
//! The supervisor ties together all components:
//! - Store Connection (exclusive instance lock, heartbeat, schema watch)
//! - Action Runtime (event sources and the ingest pipeline)
//! - Config Watch (hot reload of connection parameters)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Build actions and modifiers from the pipeline file
//! 2. Start the store connection and register the action runtime
//! 3. Start the config watch and the API server
//! 4. Main loop (log status events)
//! 5. Graceful shutdown on SIGINT or token cancellation

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracker_domain::ProcessDetails;
use tracker_store::StoreConnector;

use crate::action::ActionRegistry;
use crate::action_runtime::ActionRuntime;
use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::config_watch::ConfigWatch;
use crate::connection::{ConnectionHandle, StoreConnection};
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::EventBus;
use crate::modifier::{ModifierPipeline, ModifierRegistry};
use crate::pipeline_file::PipelineDefinition;
use crate::process::current_process;

// =============================================================================
// Supervisor
// =============================================================================

/// The tracker daemon.
pub struct DaemonSupervisor {
    /// Configuration
    config: Config,
    /// Opens store handles
    connector: Arc<dyn StoreConnector>,
    /// Identity of this process
    details: ProcessDetails,
    /// Action types
    actions: Arc<ActionRegistry>,
    /// Modifier types
    modifiers: Arc<ModifierRegistry>,
    /// Status events
    bus: Arc<EventBus>,
}

impl DaemonSupervisor {
    /// Create a supervisor with the built-in action and modifier types.
    pub fn new(config: Config, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            config,
            connector,
            details: current_process(),
            actions: Arc::new(ActionRegistry::with_builtins()),
            modifiers: Arc::new(ModifierRegistry::with_builtins()),
            bus: Arc::new(EventBus::default()),
        }
    }

    /// Replace the action and modifier registries.
    pub fn with_registries(mut self, actions: ActionRegistry, modifiers: ModifierRegistry) -> Self {
        self.actions = Arc::new(actions);
        self.modifiers = Arc::new(modifiers);
        self
    }

    /// Replace the process identity.
    pub fn with_details(mut self, details: ProcessDetails) -> Self {
        self.details = details;
        self
    }

    /// Status event bus; subscribe before `run()` to see every event.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Run the daemon.
    ///
    /// Returns when `shutdown` is cancelled, on SIGINT, or when the store
    /// connection fails fatally (returned as `Err`).
    pub async fn run(self, shutdown: CancellationToken) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            instance_uuid = %self.details.instance_uuid(),
            "Starting tracker daemon"
        );

        // 1. Actions and modifiers
        let runtime = Arc::new(self.build_runtime().await?);

        // 2. Store connection
        let mut events = self.bus.subscribe();
        let initial = match &self.config.db_config_file {
            Some(_) => None,
            None => self.config.db.clone(),
        };
        let (connection, handle) = StoreConnection::new(
            self.connector.clone(),
            self.config.connection_settings(),
            self.details.clone(),
            initial,
            self.bus.clone(),
        );
        let connection_token = CancellationToken::new();
        let mut connection_task = tokio::spawn(connection.run(connection_token.clone()));
        handle.register(runtime.clone()).await?;

        // 3. Config watch and API server
        let watch_token = shutdown.child_token();
        let watch_task = self.start_config_watch(&handle, watch_token.clone());

        let api_token = CancellationToken::new();
        let state = Arc::new(ApiState {
            connection: handle.clone(),
            runtime,
            actions: self.actions.clone(),
            modifiers: self.modifiers.clone(),
        });
        let (api_addr, api_task) = match self.start_api_server(state, api_token.clone()).await {
            Ok(started) => started,
            Err(e) => {
                connection_token.cancel();
                let _ = connection_task.await;
                return Err(e);
            },
        };
        info!(%api_addr, "API server started");

        // 4. Main loop
        info!("Entering main loop");
        let mut connection_done = None;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                },

                joined = &mut connection_task => {
                    connection_done = Some(flatten(joined));
                    break;
                },

                Some(event_result) = events.recv() => match event_result {
                    Ok(event) => event.log(),
                    Err(lagged) => warn!(%lagged, "Status receiver lagged"),
                },
            }
        }

        // 5. Graceful shutdown
        info!("Initiating graceful shutdown");
        watch_token.cancel();
        if let Some(task) = watch_task {
            if let Err(e) = flatten(task.await) {
                warn!(error = %e, "Config watch ended with error");
            }
        }

        let result = match connection_done {
            Some(result) => result,
            None => {
                connection_token.cancel();
                flatten(connection_task.await)
            },
        };

        api_token.cancel();
        if let Err(e) = api_task.await {
            warn!(error = %e, "API server task failed");
        }

        match &result {
            Ok(()) => info!("Shutdown complete"),
            Err(e) => error!(error = %e, "Daemon stopped with fatal error"),
        }
        result
    }

    /// Build the runtime from the pipeline file, if any.
    async fn build_runtime(&self) -> DaemonResult<ActionRuntime> {
        let Some(path) = &self.config.pipeline_file else {
            info!("No pipeline file configured, running without actions");
            return Ok(ActionRuntime::new(ModifierPipeline::new()));
        };

        let built = PipelineDefinition::load(path)?.build(&self.actions, &self.modifiers)?;
        for line in built.modifiers.describe() {
            debug!(step = %line, "Modifier configured");
        }
        let runtime = ActionRuntime::new(built.modifiers);
        for (type_name, action) in built.actions {
            runtime.add(type_name, action).await?;
        }
        Ok(runtime)
    }

    fn start_config_watch(
        &self,
        handle: &ConnectionHandle,
        token: CancellationToken,
    ) -> Option<JoinHandle<DaemonResult<()>>> {
        let path = self.config.db_config_file.clone()?;
        info!(path = %path.display(), "Watching database configuration");
        let watch = ConfigWatch::new(path, self.config.timing.config_poll);
        Some(tokio::spawn(watch.run(handle.clone(), token)))
    }

    /// Start the API server.
    async fn start_api_server(
        &self,
        state: Arc<ApiState>,
        token: CancellationToken,
    ) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        // Spawn the server task
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "API server error");
            }
        });

        Ok((local_addr, task))
    }
}

fn flatten(joined: Result<DaemonResult<()>, tokio::task::JoinError>) -> DaemonResult<()> {
    joined.map_err(|e| DaemonError::Lifecycle(format!("task failed: {}", e)))?
}

// =============================================================================
// Tests
// =============================================================================
