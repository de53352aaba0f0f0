//! Eventtracker Daemon
//!
//! Keeps this instance connected to the shared store and runs the
//! configured actions.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (no database: waits for one)
//! cargo run -p trackerd
//!
//! # Watch a connection file and load a pipeline
//! TRACKER_DB_CONFIG_FILE=db.json TRACKER_PIPELINE_FILE=pipeline.json \
//!     cargo run -p trackerd --features postgres
//! ```
//!
//! # Environment Variables
//!
//! - `TRACKER_ENV`: Environment (test, development, production)
//! - `TRACKER_API_HOST`: API host (default: 127.0.0.1)
//! - `TRACKER_API_PORT`: API port (default: 8089)
//! - `TRACKER_DB_CONFIG_FILE`: Watched JSON file with connection parameters
//! - `TRACKER_DB_HOST`, `TRACKER_DB_PORT`, `TRACKER_DB_NAME`,
//!   `TRACKER_DB_USER`, `TRACKER_DB_PASSWORD`: Static connection parameters
//! - `TRACKER_PIPELINE_FILE`: JSON file declaring actions and modifiers
//! - `TRACKER_LOG_JSON`: Log as JSON (1/true)

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracker_store::StoreConnector;
use trackerd::{Config, DaemonSupervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first: it decides the log format
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("trackerd=info".parse()?);
    if config.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Eventtracker Daemon"
    );

    // Create and run daemon
    let daemon = DaemonSupervisor::new(config, connector());
    daemon.run(CancellationToken::new()).await?;

    Ok(())
}

#[cfg(feature = "postgres")]
fn connector() -> Arc<dyn StoreConnector> {
    Arc::new(tracker_store::PgConnector::default())
}

#[cfg(not(feature = "postgres"))]
fn connector() -> Arc<dyn StoreConnector> {
    tracing::warn!("Built without the postgres feature, using an in-memory store");
    Arc::new(tracker_store::MemoryConnector::new(Arc::new(
        tracker_store::MemoryStore::with_schema(1),
    )))
}
