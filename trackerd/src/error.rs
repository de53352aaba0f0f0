//! Daemon error types.

use thiserror::Error;
use tracker_domain::DomainError;
use tracker_store::StoreError;
use uuid::Uuid;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The store handle could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store has no applied schema
    #[error("Store has no schema")]
    SchemaMissing,

    /// Another daemon instance holds the exclusive lock
    #[error("Locked by other instance ({active} active)")]
    LockConflict { active: u64 },

    /// Closing the local store handle failed; the process cannot continue
    #[error("Local disconnect failed: {0}")]
    LocalDisconnect(String),

    /// A dependent component failed to release the store
    #[error("Component {component} failed to stop: {message}")]
    ComponentStop { component: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid action or modifier settings
    #[error("Settings error: {0}")]
    Settings(String),

    /// Modifier failed to transform a value
    #[error("Modifier error: {0}")]
    Modifier(String),

    /// Action failed while running
    #[error("Action error: {0}")]
    Action(String),

    /// No action with this id is registered
    #[error("Action not found: {0}")]
    ActionNotFound(Uuid),

    /// Lifecycle misuse that is not a simple no-op
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

impl DaemonError {
    /// Wrap a settings validation failure.
    pub fn settings(err: impl std::fmt::Display) -> Self {
        DaemonError::Settings(err.to_string())
    }
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Why a single connect attempt failed.
///
/// Every variant is retried by the connection's retry loop.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Opening the handle failed (network, auth, pool)
    #[error("connection failed: {0}")]
    Connection(String),

    /// No schema has been applied yet
    #[error("store has no schema")]
    SchemaMissing,

    /// Another instance is still active after the orphan sweep
    #[error("locked by other instance ({active} active)")]
    LockConflict { active: u64 },
}

impl ConnectError {
    /// Status message published on the event bus for this failure.
    pub fn status_message(&self) -> &'static str {
        match self {
            ConnectError::Connection(_) => "connection failed",
            ConnectError::SchemaMissing => "no schema",
            ConnectError::LockConflict { .. } => "locked by other instance",
        }
    }
}

impl From<StoreError> for ConnectError {
    fn from(err: StoreError) -> Self {
        ConnectError::Connection(err.to_string())
    }
}

impl From<ConnectError> for DaemonError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Connection(message) => DaemonError::Connection(message),
            ConnectError::SchemaMissing => DaemonError::SchemaMissing,
            ConnectError::LockConflict { active } => DaemonError::LockConflict { active },
        }
    }
}

impl From<regex::Error> for DaemonError {
    fn from(err: regex::Error) -> Self {
        DaemonError::Settings(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_status_messages() {
        assert_eq!(
            ConnectError::Connection("refused".into()).status_message(),
            "connection failed"
        );
        assert_eq!(ConnectError::SchemaMissing.status_message(), "no schema");
        assert_eq!(
            ConnectError::LockConflict { active: 1 }.status_message(),
            "locked by other instance"
        );
    }

    #[test]
    fn test_connect_error_maps_to_daemon_error() {
        let err: DaemonError = ConnectError::LockConflict { active: 2 }.into();

        assert!(matches!(err, DaemonError::LockConflict { active: 2 }));
    }
}
