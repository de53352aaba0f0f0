//! Eventtracker Daemon Library
//!
//! Runtime that keeps exactly one daemon instance connected to the shared
//! store and feeds monitoring events into deduplicated issues.
//!
//! # Architecture
//!
//! ```text
//! Config Watch → Store Connection ──init_db / stop_db──► Action Runtime
//!                  │  (lock, heartbeat, schema watch)        │
//!                  ▼                                         ▼
//!              Event Bus (status)                  Actions → Modifier Pipeline → Issues
//!                  ▲
//!             Supervisor ── API Server
//! ```
//!
//! # Components
//!
//! - **Supervisor**: Main runtime orchestrator
//! - **Store Connection**: Connect/retry/heartbeat/schema state machine and
//!   the exclusive instance lock
//! - **Action Runtime**: Lifecycle of the configured actions, ingest of
//!   their events
//! - **Modifiers**: Field transforms applied in declared order
//! - **Event Bus**: Status events (state changes, schema drift)
//! - **API**: HTTP endpoints for administration
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tracker_store::{MemoryConnector, MemoryStore};
//! use trackerd::{Config, DaemonSupervisor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let connector = Arc::new(MemoryConnector::new(Arc::new(MemoryStore::with_schema(1))));
//!     let daemon = DaemonSupervisor::new(config, connector);
//!     daemon.run(CancellationToken::new()).await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod action;
pub mod action_runtime;
pub mod api;
pub mod component;
pub mod config;
pub mod config_watch;
pub mod connection;
pub mod error;
pub mod event_bus;
pub mod instance_lock;
pub mod modifier;
pub mod pipeline_file;
pub mod process;
pub mod retry;
pub mod supervisor;

// Re-exports for convenience
pub use action::{
    Action, ActionContext, ActionDescriptor, ActionRegistry, ActionState, EmittedEvent, Transition,
};
pub use action_runtime::{ActionRuntime, ActionSummary};
pub use component::DbComponent;
pub use config::{ApiConfig, Config, Environment, TimingConfig};
pub use config_watch::ConfigWatch;
pub use connection::{ConnectionHandle, ConnectionSettings, ConnectionState, StoreConnection};
pub use error::{ConnectError, DaemonError, DaemonResult};
pub use event_bus::{EventBus, EventReceiver, Lagged, StatusEvent, StatusLevel};
pub use modifier::{Modifier, ModifierPipeline, ModifierRegistry};
pub use pipeline_file::PipelineDefinition;
pub use retry::{RetryPolicy, RetryScheduler};
pub use supervisor::DaemonSupervisor;
