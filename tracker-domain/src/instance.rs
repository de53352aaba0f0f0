//! Daemon instance records.
//!
//! Every daemon process that ever held the store owns one row in the
//! shared `daemon_info` table. At most one row may have no stop timestamp
//! at a time; the daemon enforces this procedurally on connect.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn timestamp_with_milliseconds() -> i64 {
    Utc::now().timestamp_millis()
}

/// One row of the `daemon_info` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Instance identity (stored as 16 raw bytes)
    pub instance_uuid: Uuid,
    /// Host the instance runs on
    pub hostname: String,
    /// Process id
    pub pid: u32,
    /// Process start (ms epoch)
    pub ts_started: i64,
    /// Last heartbeat (ms epoch)
    pub ts_last_update: i64,
    /// Graceful stop (ms epoch); `None` means believed running
    pub ts_stopped: Option<i64>,
    /// Schema version observed at connect
    pub schema_version: Option<i64>,
}

impl InstanceRecord {
    /// Whether this row still claims the exclusive lock.
    pub fn is_active(&self) -> bool {
        self.ts_stopped.is_none()
    }

    /// Whether this row is running but its last heartbeat predates
    /// `older_than` (ms epoch).
    pub fn is_stale(&self, older_than: i64) -> bool {
        self.is_active() && self.ts_last_update < older_than
    }
}

/// Columns refreshed on every heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceUpdate {
    /// Host the instance runs on
    pub hostname: String,
    /// Process id
    pub pid: u32,
    /// Heartbeat timestamp (ms epoch)
    pub ts_last_update: i64,
    /// Schema version observed at connect
    pub schema_version: Option<i64>,
}

/// Descriptive details of the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDetails {
    instance_uuid: Uuid,
    hostname: String,
    pid: u32,
    ts_started: i64,
    schema_version: Option<i64>,
}

impl ProcessDetails {
    /// Create process details with a fresh time-ordered instance id.
    pub fn new(hostname: impl Into<String>, pid: u32, ts_started: i64) -> Self {
        Self::with_uuid(Uuid::now_v7(), hostname, pid, ts_started)
    }

    /// Create process details for a known instance id.
    pub fn with_uuid(instance_uuid: Uuid, hostname: impl Into<String>, pid: u32, ts_started: i64) -> Self {
        Self {
            instance_uuid,
            hostname: hostname.into(),
            pid,
            ts_started,
            schema_version: None,
        }
    }

    /// Instance id.
    pub fn instance_uuid(&self) -> Uuid {
        self.instance_uuid
    }

    /// Host name.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Schema version captured at the last successful connect.
    pub fn schema_version(&self) -> Option<i64> {
        self.schema_version
    }

    /// Record the schema version observed at connect.
    pub fn set_schema_version(&mut self, version: i64) {
        self.schema_version = Some(version);
    }

    /// Full row for a first insert.
    pub fn properties_to_insert(&self, now: i64) -> InstanceRecord {
        InstanceRecord {
            instance_uuid: self.instance_uuid,
            hostname: self.hostname.clone(),
            pid: self.pid,
            ts_started: self.ts_started,
            ts_last_update: now,
            ts_stopped: None,
            schema_version: self.schema_version,
        }
    }

    /// Columns for a heartbeat update.
    pub fn properties_to_update(&self, now: i64) -> InstanceUpdate {
        InstanceUpdate {
            hostname: self.hostname.clone(),
            pid: self.pid,
            ts_last_update: now,
            schema_version: self.schema_version,
        }
    }
}
