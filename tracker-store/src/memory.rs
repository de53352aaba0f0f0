//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access. Several connectors
//! may share one `MemoryStore` to simulate daemons on a shared database.

use crate::error::StoreError;
use crate::repository::{
    InstanceRepository, IssueRepository, SchemaCheck, Store, StoreConnector, StoreHandle,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracker_domain::{DbConfig, InstanceRecord, InstanceUpdate, Issue, IssueChecksum};
use uuid::Uuid;

/// In-memory store for testing
pub struct MemoryStore {
    instances: RwLock<HashMap<Uuid, InstanceRecord>>,
    issues: RwLock<HashMap<IssueChecksum, Issue>>,
    /// `None` means no schema has been applied
    schema_version: RwLock<Option<i64>>,
    close_count: AtomicUsize,
}

impl MemoryStore {
    /// Create a new empty store without schema
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            issues: RwLock::new(HashMap::new()),
            schema_version: RwLock::new(None),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Create a new empty store with the given schema version applied
    pub fn with_schema(version: i64) -> Self {
        let store = Self::new();
        store.set_schema_version(Some(version));
        store
    }

    /// Apply (or remove, with `None`) a schema version out-of-band
    pub fn set_schema_version(&self, version: Option<i64>) {
        *self.schema_version.write().unwrap() = version;
    }

    /// Insert a raw instance row, bypassing the daemon (test setup)
    pub fn put_instance(&self, record: InstanceRecord) {
        self.instances.write().unwrap().insert(record.instance_uuid, record);
    }

    /// Snapshot of one instance row
    pub fn instance(&self, instance_uuid: Uuid) -> Option<InstanceRecord> {
        self.instances.read().unwrap().get(&instance_uuid).cloned()
    }

    /// Get the number of instance rows
    pub fn instance_count(&self) -> usize {
        self.instances.read().unwrap().len()
    }

    /// Get the number of issues
    pub fn issue_count(&self) -> usize {
        self.issues.read().unwrap().len()
    }

    /// Snapshot of all issues
    pub fn all_issues(&self) -> Vec<Issue> {
        self.issues.read().unwrap().values().cloned().collect()
    }

    /// How often `close()` was called on handles of this store
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        self.instances.write().unwrap().clear();
        self.issues.write().unwrap().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Instance Repository
// =============================================================================

#[async_trait]
impl InstanceRepository for MemoryStore {
    async fn delete_stopped(&self) -> Result<u64, StoreError> {
        let mut instances = self.instances.write().unwrap();
        let before = instances.len();
        instances.retain(|_, r| r.ts_stopped.is_none());
        Ok((before - instances.len()) as u64)
    }

    async fn delete_instance(&self, instance_uuid: Uuid) -> Result<u64, StoreError> {
        let removed = self.instances.write().unwrap().remove(&instance_uuid);
        Ok(u64::from(removed.is_some()))
    }

    async fn delete_stale(&self, older_than: i64) -> Result<u64, StoreError> {
        let mut instances = self.instances.write().unwrap();
        let before = instances.len();
        instances.retain(|_, r| !r.is_stale(older_than));
        Ok((before - instances.len()) as u64)
    }

    async fn count_active(&self) -> Result<u64, StoreError> {
        let instances = self.instances.read().unwrap();
        Ok(instances.values().filter(|r| r.is_active()).count() as u64)
    }

    async fn update(&self, instance_uuid: Uuid, update: &InstanceUpdate) -> Result<u64, StoreError> {
        let mut instances = self.instances.write().unwrap();
        match instances.get_mut(&instance_uuid) {
            Some(record) => {
                record.hostname = update.hostname.clone();
                record.pid = update.pid;
                record.ts_last_update = update.ts_last_update;
                record.schema_version = update.schema_version;
                record.ts_stopped = None;
                Ok(1)
            },
            None => Ok(0),
        }
    }

    async fn insert(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        let mut instances = self.instances.write().unwrap();
        if instances.contains_key(&record.instance_uuid) {
            return Err(StoreError::duplicate("instance", record.instance_uuid.to_string()));
        }
        instances.insert(record.instance_uuid, record.clone());
        Ok(())
    }

    async fn mark_stopped(&self, instance_uuid: Uuid, ts_stopped: i64) -> Result<u64, StoreError> {
        let mut instances = self.instances.write().unwrap();
        match instances.get_mut(&instance_uuid) {
            Some(record) => {
                record.ts_stopped = Some(ts_stopped);
                Ok(1)
            },
            None => Ok(0),
        }
    }

    async fn find_all(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        let mut records: Vec<_> = self.instances.read().unwrap().values().cloned().collect();
        records.sort_by_key(|r| (r.ts_started, r.instance_uuid));
        Ok(records)
    }
}

// =============================================================================
// Issue Repository
// =============================================================================

#[async_trait]
impl IssueRepository for MemoryStore {
    async fn record_event(&self, event: &Value, now: i64) -> Result<Issue, StoreError> {
        let checksum = IssueChecksum::for_event(event);
        let mut issues = self.issues.write().unwrap();
        let issue = match issues.get_mut(&checksum) {
            Some(existing) => {
                existing.refresh(event.clone(), now);
                existing.clone()
            },
            None => {
                let issue = Issue::from_event(event.clone(), now);
                issues.insert(checksum, issue.clone());
                issue
            },
        };
        Ok(issue)
    }

    async fn find_by_checksum(&self, checksum: &IssueChecksum) -> Result<Option<Issue>, StoreError> {
        Ok(self.issues.read().unwrap().get(checksum).cloned())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.issues.read().unwrap().len() as u64)
    }
}

// =============================================================================
// Schema Check
// =============================================================================

#[async_trait]
impl SchemaCheck for MemoryStore {
    async fn has_schema(&self) -> Result<bool, StoreError> {
        Ok(self.schema_version.read().unwrap().is_some())
    }

    async fn schema_version(&self) -> Result<i64, StoreError> {
        self.schema_version
            .read()
            .unwrap()
            .ok_or_else(|| StoreError::Database("schema migration table is missing".to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
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
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Connector handing out the same shared `MemoryStore` for every config.
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    reachable: AtomicBool,
    open_count: AtomicUsize,
}

impl MemoryConnector {
    /// Create a connector over a shared store
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            reachable: AtomicBool::new(true),
            open_count: AtomicUsize::new(0),
        }
    }

    /// The shared store behind this connector
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Simulate the server going away (or coming back)
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of successful `open()` calls
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn open(&self, config: &DbConfig) -> Result<StoreHandle, StoreError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!(
                "{}:{} is unreachable",
                config.host, config.port
            )));
        }
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let handle: StoreHandle = self.store.clone();
        Ok(handle)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracker_domain::ProcessDetails;

    fn record(ts_last_update: i64, ts_stopped: Option<i64>) -> InstanceRecord {
        let mut record = ProcessDetails::new("host", 1, 0).properties_to_insert(ts_last_update);
        record.ts_stopped = ts_stopped;
        record
    }

    #[tokio::test]
    async fn test_insert_and_update_instance() {
        let store = MemoryStore::new();
        let details = ProcessDetails::new("web1", 10, 0);

        store.insert(&details.properties_to_insert(100)).await.unwrap();
        let updated = store
            .update(details.instance_uuid(), &details.properties_to_update(200))
            .await
            .unwrap();

        assert_eq!(updated, 1);
        assert_eq!(store.instance(details.instance_uuid()).unwrap().ts_last_update, 200);
    }

    #[tokio::test]
    async fn test_update_missing_instance_reports_zero() {
        let store = MemoryStore::new();
        let details = ProcessDetails::new("web1", 10, 0);

        let updated = store
            .update(details.instance_uuid(), &details.properties_to_update(200))
            .await
            .unwrap();

        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let store = MemoryStore::new();
        let row = record(0, None);

        store.insert(&row).await.unwrap();
        assert!(matches!(store.insert(&row).await, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_delete_stopped_and_stale() {
        let store = MemoryStore::new();
        store.put_instance(record(1_000, Some(2_000)));
        store.put_instance(record(1_000, None));
        store.put_instance(record(90_000, None));

        assert_eq!(store.delete_stopped().await.unwrap(), 1);
        assert_eq!(store.delete_stale(50_000).await.unwrap(), 1);
        assert_eq!(store.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_stopped() {
        let store = MemoryStore::new();
        let row = record(0, None);
        store.put_instance(row.clone());

        assert_eq!(store.mark_stopped(row.instance_uuid, 5).await.unwrap(), 1);
        assert_eq!(store.count_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_event_deduplicates() {
        let store = MemoryStore::new();
        let event = json!({ "host_name": "web1", "message": "disk full" });

        let first = store.record_event(&event, 10).await.unwrap();
        let second = store.record_event(&event, 20).await.unwrap();

        assert_eq!(first.uuid, second.uuid);
        assert_eq!(second.event_count, 2);
        assert_eq!(IssueRepository::count(&store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_schema_version_lookup() {
        let store = MemoryStore::new();
        assert!(!store.has_schema().await.unwrap());
        assert!(store.schema_version().await.is_err());

        store.set_schema_version(Some(3));
        assert!(store.has_schema().await.unwrap());
        assert_eq!(store.schema_version().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_connector_unreachable() {
        let connector = MemoryConnector::new(Arc::new(MemoryStore::new()));
        let config = DbConfig::new("db1", "eventtracker", "et", "");

        connector.set_reachable(false);
        assert!(matches!(connector.open(&config).await, Err(StoreError::Connection(_))));

        connector.set_reachable(true);
        assert!(connector.open(&config).await.is_ok());
        assert_eq!(connector.open_count(), 1);
    }
}
