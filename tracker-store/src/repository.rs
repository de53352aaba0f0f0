//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the daemon.
//! Implementations can be PostgreSQL, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracker_domain::{DbConfig, InstanceRecord, InstanceUpdate, Issue, IssueChecksum};
use uuid::Uuid;

/// Repository for `daemon_info` rows
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Delete every row that carries a stop timestamp
    async fn delete_stopped(&self) -> Result<u64, StoreError>;

    /// Delete the row of a specific instance
    async fn delete_instance(&self, instance_uuid: Uuid) -> Result<u64, StoreError>;

    /// Delete running rows whose heartbeat is older than `older_than` (ms epoch)
    async fn delete_stale(&self, older_than: i64) -> Result<u64, StoreError>;

    /// Count rows without a stop timestamp
    async fn count_active(&self) -> Result<u64, StoreError>;

    /// Refresh heartbeat columns and clear `ts_stopped`; returns the number
    /// of updated rows
    async fn update(&self, instance_uuid: Uuid, update: &InstanceUpdate) -> Result<u64, StoreError>;

    /// Insert a new row
    async fn insert(&self, record: &InstanceRecord) -> Result<(), StoreError>;

    /// Set the stop timestamp of an instance
    async fn mark_stopped(&self, instance_uuid: Uuid, ts_stopped: i64) -> Result<u64, StoreError>;

    /// All rows, oldest start first
    async fn find_all(&self) -> Result<Vec<InstanceRecord>, StoreError>;
}

/// Repository for issues
#[async_trait]
pub trait IssueRepository: Send + Sync {
    /// Create or refresh the issue matching this event's checksum
    async fn record_event(&self, event: &Value, now: i64) -> Result<Issue, StoreError>;

    /// Find an issue by checksum
    async fn find_by_checksum(&self, checksum: &IssueChecksum) -> Result<Option<Issue>, StoreError>;

    /// Number of open issues
    async fn count(&self) -> Result<u64, StoreError>;
}

/// Read-only view of the externally managed schema migrations
#[async_trait]
pub trait SchemaCheck: Send + Sync {
    /// Whether any schema has been applied
    async fn has_schema(&self) -> Result<bool, StoreError>;

    /// Latest applied migration number
    async fn schema_version(&self) -> Result<i64, StoreError>;
}

/// Combined store interface
#[async_trait]
pub trait Store: Send + Sync {
    /// Get instance repository
    fn instances(&self) -> &dyn InstanceRepository;

    /// Get issue repository
    fn issues(&self) -> &dyn IssueRepository;

    /// Get schema check
    fn schema(&self) -> &dyn SchemaCheck;

    /// Release the underlying connection(s)
    async fn close(&self) -> Result<(), StoreError> {
        Ok(()) // Default no-op for stores without connections
    }
}

/// Shared reference to an open store.
pub type StoreHandle = Arc<dyn Store>;

/// Opens store handles from connection parameters
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Open a new handle. Failures here are transient connection errors.
    async fn open(&self, config: &DbConfig) -> Result<StoreHandle, StoreError>;
}
