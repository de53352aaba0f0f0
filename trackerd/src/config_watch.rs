//! Hot reload of the connection parameters file.
//!
//! The file is polled. Whenever its parsed content differs from what was
//! last delivered, the new value goes to the store connection. A missing or
//! invalid file means "no valid configuration".

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracker_domain::DbConfig;

use crate::connection::ConnectionHandle;
use crate::error::DaemonResult;

/// Read and validate the connection parameters file.
pub fn read_config(path: &Path) -> Result<DbConfig, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    DbConfig::from_json(&raw).map_err(|e| e.to_string())
}

/// Poller of one config file.
pub struct ConfigWatch {
    path: PathBuf,
    poll: Duration,
    last: Option<Option<DbConfig>>,
}

impl ConfigWatch {
    /// Watch `path`, checking every `poll`.
    pub fn new(path: impl Into<PathBuf>, poll: Duration) -> Self {
        Self {
            path: path.into(),
            poll,
            last: None,
        }
    }

    /// Watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file; return the new value if it changed since the last call.
    ///
    /// The first call always returns a value.
    pub fn poll_once(&mut self) -> Option<Option<DbConfig>> {
        let current = match read_config(&self.path) {
            Ok(config) => Some(config),
            Err(reason) => {
                if !matches!(self.last, Some(None)) {
                    let was_valid = matches!(self.last, Some(Some(_)));
                    error!(
                        path = %self.path.display(),
                        %reason,
                        "Database configuration {}",
                        if was_valid { "is no longer valid" } else { "is not valid" }
                    );
                }
                None
            },
        };

        if self.last.as_ref() == Some(&current) {
            return None;
        }
        if let Some(config) = &current {
            info!(path = %self.path.display(), host = %config.host, database = %config.database, "Database configuration changed");
        }
        self.last = Some(current.clone());
        Some(current)
    }

    /// Poll until `shutdown` is cancelled, forwarding changes to `connection`.
    pub async fn run(mut self, connection: ConnectionHandle, shutdown: CancellationToken) -> DaemonResult<()> {
        let mut ticker = interval(self.poll.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(path = %self.path.display(), poll_ms = self.poll.as_millis() as u64, "Config watch started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {},
            }

            if let Some(config) = self.poll_once() {
                connection.config_changed(config).await?;
            }
        }

        debug!("Config watch stopped");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, value: &serde_json::Value) -> PathBuf {
        let path = dir.path().join("db.json");
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn config_json(database: &str) -> serde_json::Value {
        json!({
            "host": "db.test",
            "database": database,
            "username": "tracker",
            "password": "secret"
        })
    }

    #[test]
    fn test_first_poll_always_delivers() {
        let dir = TempDir::new().unwrap();
        let mut watch = ConfigWatch::new(dir.path().join("missing.json"), Duration::from_secs(1));

        assert_eq!(watch.poll_once(), Some(None));
        assert_eq!(watch.poll_once(), None);
    }

    #[test]
    fn test_delivers_only_changes() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &config_json("a"));
        let mut watch = ConfigWatch::new(&path, Duration::from_secs(1));

        let first = watch.poll_once().unwrap().unwrap();
        assert_eq!(first.database, "a");
        assert_eq!(watch.poll_once(), None);

        write(&dir, &config_json("b"));
        assert_eq!(watch.poll_once().unwrap().unwrap().database, "b");
    }

    #[test]
    fn test_invalid_file_is_no_configuration() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &config_json("a"));
        let mut watch = ConfigWatch::new(&path, Duration::from_secs(1));
        watch.poll_once();

        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(watch.poll_once(), Some(None));
        assert!(read_config(&path).is_err());
    }
}
