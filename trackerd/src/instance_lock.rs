//! Exclusive-instance protocol over the `daemon_info` table.
//!
//! There is no database lock. Exclusivity is procedural:
//! 1. delete rows already marked stopped
//! 2. delete any row carrying our own instance id (left over from a crash)
//! 3. delete running rows whose heartbeat is older than the stale threshold
//! 4. if any running row remains, another instance is active
//!
//! The winner writes its own row as the last step of the attempt and keeps
//! it fresh with heartbeats.

use std::time::Duration;

use tracing::{debug, info, warn};
use tracker_domain::{timestamp_with_milliseconds, DbConfig, ProcessDetails};
use tracker_store::{Store, StoreConnector, StoreError, StoreHandle};
use uuid::Uuid;

use crate::error::ConnectError;

/// Rows removed by an orphan sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows that were already marked stopped
    pub stopped: u64,
    /// Residue of this instance id
    pub own: u64,
    /// Running rows without a recent heartbeat
    pub stale: u64,
}

impl SweepReport {
    /// Total number of removed rows.
    pub fn total(&self) -> u64 {
        self.stopped + self.own + self.stale
    }
}

/// A store handle that passed the schema and exclusivity checks.
pub struct LockedStore {
    /// The open handle
    pub store: StoreHandle,
    /// Schema version observed during the attempt
    pub schema_version: i64,
}

/// Delete orphaned rows.
///
/// `now` and the stale threshold are in milliseconds.
pub async fn sweep_orphans(
    store: &dyn Store,
    instance_uuid: Uuid,
    now: i64,
    stale_after: Duration,
) -> Result<SweepReport, StoreError> {
    let instances = store.instances();
    let stale_ms = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);

    let report = SweepReport {
        stopped: instances.delete_stopped().await?,
        own: instances.delete_instance(instance_uuid).await?,
        stale: instances.delete_stale(now.saturating_sub(stale_ms)).await?,
    };

    if report.total() > 0 {
        info!(
            stopped = report.stopped,
            own = report.own,
            stale = report.stale,
            "Removed orphaned instance rows"
        );
    }
    Ok(report)
}

/// Fail with `LockConflict` while any running row remains.
pub async fn ensure_exclusive(store: &dyn Store) -> Result<(), ConnectError> {
    let active = store.instances().count_active().await?;
    if active > 0 {
        return Err(ConnectError::LockConflict { active });
    }
    Ok(())
}

/// One connect attempt: open, check schema, sweep, check exclusivity and
/// finally write our own row with the observed schema version.
///
/// On failure after the handle was opened, the handle is closed before
/// returning so retries do not pile up connections.
pub async fn acquire(
    connector: &dyn StoreConnector,
    config: &DbConfig,
    details: &ProcessDetails,
    stale_after: Duration,
) -> Result<LockedStore, ConnectError> {
    let store = connector
        .open(config)
        .await
        .map_err(|e| ConnectError::Connection(e.to_string()))?;

    match claim(store.as_ref(), details, stale_after).await {
        Ok(schema_version) => Ok(LockedStore {
            store,
            schema_version,
        }),
        Err(err) => {
            if let Err(close_err) = store.close().await {
                warn!(error = %close_err, "Failed to close rejected store handle");
            }
            Err(err)
        },
    }
}

async fn claim(
    store: &dyn Store,
    details: &ProcessDetails,
    stale_after: Duration,
) -> Result<i64, ConnectError> {
    if !store.schema().has_schema().await? {
        return Err(ConnectError::SchemaMissing);
    }
    let schema_version = store.schema().schema_version().await?;

    let now = timestamp_with_milliseconds();
    sweep_orphans(store, details.instance_uuid(), now, stale_after).await?;
    ensure_exclusive(store).await?;

    let mut details = details.clone();
    details.set_schema_version(schema_version);
    store.instances().insert(&details.properties_to_insert(now)).await?;

    debug!(schema_version, "Instance lock acquired");
    Ok(schema_version)
}

/// Refresh our own row, inserting it when it has gone missing.
pub async fn write_heartbeat(
    store: &dyn Store,
    details: &ProcessDetails,
    now: i64,
) -> Result<(), StoreError> {
    let instances = store.instances();
    let updated = instances
        .update(details.instance_uuid(), &details.properties_to_update(now))
        .await?;
    if updated == 0 {
        instances.insert(&details.properties_to_insert(now)).await?;
        debug!(instance_uuid = %details.instance_uuid(), "Instance row inserted");
    }
    Ok(())
}

/// Mark our own row stopped. Best-effort: failures are logged only.
pub async fn release(store: &dyn Store, instance_uuid: Uuid, now: i64) {
    match store.instances().mark_stopped(instance_uuid, now).await {
        Ok(0) => debug!(%instance_uuid, "No instance row to mark stopped"),
        Ok(_) => debug!(%instance_uuid, "Instance row marked stopped"),
        Err(e) => warn!(%instance_uuid, error = %e, "Failed to mark instance stopped"),
    }
}

// =============================================================================
// Tests
// =============================================================================
