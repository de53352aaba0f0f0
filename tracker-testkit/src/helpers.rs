//! Fault injection and fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracker_domain::{DbConfig, InstanceRecord, InstanceUpdate, Issue, IssueChecksum};
use tracker_store::{
    InstanceRepository, IssueRepository, MemoryStore, SchemaCheck, Store, StoreConnector,
    StoreError, StoreHandle,
};
use uuid::Uuid;

// =============================================================================
// Fixtures
// =============================================================================

/// Connection parameters pointing at a named database.
pub fn db_config(database: &str) -> DbConfig {
    DbConfig::new("db.test", database, "tracker", "secret")
}

/// A row that looks like a live instance which heartbeated at `ts_last_update`.
pub fn running_record(ts_last_update: i64) -> InstanceRecord {
    InstanceRecord {
        instance_uuid: Uuid::now_v7(),
        hostname: "other-host".to_string(),
        pid: 4242,
        ts_started: ts_last_update,
        ts_last_update,
        ts_stopped: None,
        schema_version: Some(1),
    }
}

/// A row of an instance that shut down cleanly.
pub fn stopped_record(ts_stopped: i64) -> InstanceRecord {
    InstanceRecord {
        ts_stopped: Some(ts_stopped),
        ..running_record(ts_stopped)
    }
}

/// A running row whose heartbeat is `age_ms` older than `now`.
pub fn stale_record(now: i64, age_ms: i64) -> InstanceRecord {
    running_record(now - age_ms)
}

/// A monitoring event with every checksum field set.
pub fn sample_event(host: &str, message: &str) -> Value {
    json!({
        "host_name": host,
        "object_name": "disk /var",
        "object_class": "filesystem",
        "sender_event_id": "42",
        "message": message,
        "severity": "critical",
    })
}

// =============================================================================
// Flaky Connector
// =============================================================================

#[derive(Default)]
struct Faults {
    fail_heartbeat: AtomicBool,
    fail_close: AtomicBool,
}

/// Connector over a shared `MemoryStore` with switchable failures.
///
/// - databases marked unreachable fail `open()` with a connection error
/// - `fail_heartbeat` makes instance `update`/`insert` fail on open handles
/// - `fail_close` makes `close()` fail on open handles
pub struct FlakyConnector {
    store: Arc<MemoryStore>,
    unreachable: Mutex<HashSet<String>>,
    attempts: Mutex<HashMap<String, usize>>,
    faults: Arc<Faults>,
}

impl FlakyConnector {
    /// Create a connector where every database is reachable.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            unreachable: Mutex::new(HashSet::new()),
            attempts: Mutex::new(HashMap::new()),
            faults: Arc::new(Faults::default()),
        }
    }

    /// The shared store behind this connector.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Make `open()` fail for the named database (or succeed again).
    pub fn set_unreachable(&self, database: &str, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(database.to_string());
        } else {
            set.remove(database);
        }
    }

    /// Number of `open()` calls made for the named database, failed or not.
    pub fn attempts(&self, database: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(database)
            .copied()
            .unwrap_or(0)
    }

    /// Make heartbeat writes fail.
    pub fn set_fail_heartbeat(&self, fail: bool) {
        self.faults.fail_heartbeat.store(fail, Ordering::SeqCst);
    }

    /// Make `close()` fail.
    pub fn set_fail_close(&self, fail: bool) {
        self.faults.fail_close.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreConnector for FlakyConnector {
    async fn open(&self, config: &DbConfig) -> Result<StoreHandle, StoreError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(config.database.clone())
            .or_insert(0) += 1;

        if self.unreachable.lock().unwrap().contains(&config.database) {
            return Err(StoreError::Connection(format!(
                "database {} is unreachable",
                config.database
            )));
        }

        let handle: StoreHandle = Arc::new(FlakyStore {
            inner: self.store.clone(),
            faults: self.faults.clone(),
        });
        Ok(handle)
    }
}

// =============================================================================
// Flaky Store
// =============================================================================

/// Store handle returned by `FlakyConnector`.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    faults: Arc<Faults>,
}

impl FlakyStore {
    fn heartbeat_fault(&self) -> Result<(), StoreError> {
        if self.faults.fail_heartbeat.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("connection reset by peer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceRepository for FlakyStore {
    async fn delete_stopped(&self) -> Result<u64, StoreError> {
        self.inner.delete_stopped().await
    }

    async fn delete_instance(&self, instance_uuid: Uuid) -> Result<u64, StoreError> {
        self.inner.delete_instance(instance_uuid).await
    }

    async fn delete_stale(&self, older_than: i64) -> Result<u64, StoreError> {
        self.inner.delete_stale(older_than).await
    }

    async fn count_active(&self) -> Result<u64, StoreError> {
        self.inner.count_active().await
    }

    async fn update(&self, instance_uuid: Uuid, update: &InstanceUpdate) -> Result<u64, StoreError> {
        self.heartbeat_fault()?;
        self.inner.update(instance_uuid, update).await
    }

    async fn insert(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        self.heartbeat_fault()?;
        self.inner.insert(record).await
    }

    async fn mark_stopped(&self, instance_uuid: Uuid, ts_stopped: i64) -> Result<u64, StoreError> {
        self.inner.mark_stopped(instance_uuid, ts_stopped).await
    }

    async fn find_all(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        self.inner.find_all().await
    }
}

#[async_trait]
impl IssueRepository for FlakyStore {
    async fn record_event(&self, event: &Value, now: i64) -> Result<Issue, StoreError> {
        self.inner.record_event(event, now).await
    }

    async fn find_by_checksum(&self, checksum: &IssueChecksum) -> Result<Option<Issue>, StoreError> {
        self.inner.find_by_checksum(checksum).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        IssueRepository::count(self.inner.as_ref()).await
    }
}

#[async_trait]
impl SchemaCheck for FlakyStore {
    async fn has_schema(&self) -> Result<bool, StoreError> {
        self.inner.has_schema().await
    }

    async fn schema_version(&self) -> Result<i64, StoreError> {
        self.inner.schema_version().await
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn instances(&self) -> &dyn InstanceRepository {
        self
    }

    fn issues(&self) -> &dyn IssueRepository {
        self
    }

    fn schema(&self) -> &dyn SchemaCheck {
        self
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.faults.fail_close.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("close failed: socket error".to_string()));
        }
        Store::close(self.inner.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_database_counts_attempts() {
        let connector = FlakyConnector::new(Arc::new(MemoryStore::with_schema(1)));
        connector.set_unreachable("a", true);

        assert!(connector.open(&db_config("a")).await.is_err());
        assert!(connector.open(&db_config("b")).await.is_ok());
        assert_eq!(connector.attempts("a"), 1);
        assert_eq!(connector.attempts("b"), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_fault_blocks_writes() {
        let connector = FlakyConnector::new(Arc::new(MemoryStore::with_schema(1)));
        let store = connector.open(&db_config("a")).await.unwrap();
        connector.set_fail_heartbeat(true);

        assert!(store.instances().insert(&running_record(0)).await.is_err());
        assert_eq!(store.instances().count_active().await.unwrap(), 0);
    }

    #[test]
    fn test_stale_record_age() {
        let record = stale_record(100_000, 61_000);

        assert_eq!(record.ts_last_update, 39_000);
        assert!(record.ts_stopped.is_none());
    }
}
