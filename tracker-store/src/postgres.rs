//! PostgreSQL store.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.
//!
//! Instance ids are stored as 16 raw bytes in `daemon_info.instance_uuid_hex`,
//! all timestamps are millisecond epochs in BIGINT columns.

use crate::error::StoreError;
use crate::repository::{
    InstanceRepository, IssueRepository, SchemaCheck, Store, StoreConnector, StoreHandle,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracker_domain::{DbConfig, InstanceRecord, InstanceUpdate, Issue, IssueChecksum};
use uuid::Uuid;

/// Table holding one row per daemon instance.
const DAEMON_INFO: &str = "daemon_info";

/// Table maintained by the external migration tool.
const SCHEMA_MIGRATION: &str = "eventtracker_schema_migration";

// =============================================================================
// Connector
// =============================================================================

/// Opens a `PgStore` per configuration.
pub struct PgConnector {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgConnector {
    /// Create a connector with pool limits.
    pub fn new(max_connections: u32, acquire_timeout: Duration) -> Self {
        Self {
            max_connections,
            acquire_timeout,
        }
    }
}

impl Default for PgConnector {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(10))
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    async fn open(&self, config: &DbConfig) -> Result<StoreHandle, StoreError> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&config.to_url())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!(host = %config.host, database = %config.database, "PostgreSQL pool opened");
        let handle: StoreHandle = Arc::new(PgStore::new(pool));
        Ok(handle)
    }
}

// =============================================================================
// Store
// =============================================================================

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_instance_row(row: &PgRow) -> Result<InstanceRecord, StoreError> {
    let raw_uuid: Vec<u8> = row.try_get("instance_uuid_hex")?;
    let instance_uuid = Uuid::from_slice(&raw_uuid)
        .map_err(|e| StoreError::Serialization(format!("Invalid instance uuid: {}", e)))?;
    let pid: i64 = row.try_get("pid")?;

    Ok(InstanceRecord {
        instance_uuid,
        hostname: row.try_get("hostname")?,
        pid: u32::try_from(pid)
            .map_err(|_| StoreError::Serialization(format!("Invalid pid: {}", pid)))?,
        ts_started: row.try_get("ts_started")?,
        ts_last_update: row.try_get("ts_last_update")?,
        ts_stopped: row.try_get("ts_stopped")?,
        schema_version: row.try_get("schema_version")?,
    })
}

fn parse_issue_row(row: &PgRow) -> Result<Issue, StoreError> {
    let raw_uuid: Vec<u8> = row.try_get("issue_uuid")?;
    let uuid = Uuid::from_slice(&raw_uuid)
        .map_err(|e| StoreError::Serialization(format!("Invalid issue uuid: {}", e)))?;
    let event_count: i64 = row.try_get("event_count")?;
    let checksum: String = row.try_get("checksum")?;
    let attributes: Value = row.try_get("attributes")?;

    Ok(Issue {
        uuid,
        checksum: IssueChecksum::from_stored(checksum),
        attributes,
        event_count: u64::try_from(event_count).unwrap_or_default(),
        ts_first_event: row.try_get("ts_first_event")?,
        ts_last_modified: row.try_get("ts_last_modified")?,
    })
}

#[async_trait]
impl InstanceRepository for PgStore {
    async fn delete_stopped(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE ts_stopped IS NOT NULL", DAEMON_INFO))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_instance(&self, instance_uuid: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE instance_uuid_hex = $1", DAEMON_INFO))
            .bind(instance_uuid.as_bytes().as_slice())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_stale(&self, older_than: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE ts_stopped IS NULL AND ts_last_update < $1",
            DAEMON_INFO
        ))
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_active(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE ts_stopped IS NULL",
            DAEMON_INFO
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn update(&self, instance_uuid: Uuid, update: &InstanceUpdate) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
               SET hostname = $2, pid = $3, ts_last_update = $4, schema_version = $5,
                   ts_stopped = NULL
             WHERE instance_uuid_hex = $1
            "#,
            DAEMON_INFO
        ))
        .bind(instance_uuid.as_bytes().as_slice())
        .bind(&update.hostname)
        .bind(i64::from(update.pid))
        .bind(update.ts_last_update)
        .bind(update.schema_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (
                instance_uuid_hex, hostname, pid,
                ts_started, ts_last_update, ts_stopped, schema_version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
            DAEMON_INFO
        ))
        .bind(record.instance_uuid.as_bytes().as_slice())
        .bind(&record.hostname)
        .bind(i64::from(record.pid))
        .bind(record.ts_started)
        .bind(record.ts_last_update)
        .bind(record.ts_stopped)
        .bind(record.schema_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_stopped(&self, instance_uuid: Uuid, ts_stopped: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET ts_stopped = $2 WHERE instance_uuid_hex = $1",
            DAEMON_INFO
        ))
        .bind(instance_uuid.as_bytes().as_slice())
        .bind(ts_stopped)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_all(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT instance_uuid_hex, hostname, pid, ts_started,
                   ts_last_update, ts_stopped, schema_version
              FROM {}
             ORDER BY ts_started ASC
            "#,
            DAEMON_INFO
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_instance_row).collect()
    }
}

#[async_trait]
impl IssueRepository for PgStore {
    async fn record_event(&self, event: &Value, now: i64) -> Result<Issue, StoreError> {
        let candidate = Issue::from_event(event.clone(), now);
        let row = sqlx::query(
            r#"
            INSERT INTO issue (
                issue_uuid, checksum, attributes, event_count, ts_first_event, ts_last_modified
            ) VALUES ($1, $2, $3, 1, $4, $4)
            ON CONFLICT (checksum) DO UPDATE
               SET attributes = EXCLUDED.attributes,
                   event_count = issue.event_count + 1,
                   ts_last_modified = EXCLUDED.ts_last_modified
            RETURNING issue_uuid, checksum, attributes, event_count, ts_first_event, ts_last_modified
            "#,
        )
        .bind(candidate.uuid.as_bytes().as_slice())
        .bind(candidate.checksum.as_str())
        .bind(&candidate.attributes)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        parse_issue_row(&row)
    }

    async fn find_by_checksum(&self, checksum: &IssueChecksum) -> Result<Option<Issue>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT issue_uuid, checksum, attributes, event_count, ts_first_event, ts_last_modified
              FROM issue
             WHERE checksum = $1
            "#,
        )
        .bind(checksum.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parse_issue_row).transpose()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issue")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl SchemaCheck for PgStore {
    async fn has_schema(&self) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(SCHEMA_MIGRATION)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn schema_version(&self) -> Result<i64, StoreError> {
        let version: i64 = sqlx::query_scalar(&format!(
            "SELECT COALESCE(MAX(schema_version), 0)::BIGINT FROM {}",
            SCHEMA_MIGRATION
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(version)
    }
}

#[async_trait]
impl Store for PgStore {
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
        self.pool.close().await;
        Ok(())
    }
}
