//! DB-backed tests for the PostgreSQL store.
//!
//! Run with `DATABASE_URL` set and `--features postgres -- --ignored`.

#![cfg(feature = "postgres")]

use serde_json::json;
use sqlx::PgPool;
use tracker_domain::{InstanceRecord, IssueChecksum, ProcessDetails};
use tracker_store::{PgStore, Store};
use uuid::Uuid;

fn running(ts_last_update: i64) -> InstanceRecord {
    InstanceRecord {
        instance_uuid: Uuid::now_v7(),
        hostname: "pg-host".to_string(),
        pid: 31337,
        ts_started: ts_last_update,
        ts_last_update,
        ts_stopped: None,
        schema_version: Some(1),
    }
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_schema_version_lookup(pool: PgPool) {
    let store = PgStore::new(pool);

    assert!(store.schema().has_schema().await.unwrap());
    assert_eq!(store.schema().schema_version().await.unwrap(), 1);
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_instance_row_lifecycle(pool: PgPool) {
    let store = PgStore::new(pool);
    let mut details = ProcessDetails::new("pg-host", 4000, 1_000);
    details.set_schema_version(1);

    store
        .instances()
        .insert(&details.properties_to_insert(1_000))
        .await
        .unwrap();
    let updated = store
        .instances()
        .update(details.instance_uuid(), &details.properties_to_update(4_000))
        .await
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(store.instances().count_active().await.unwrap(), 1);

    store
        .instances()
        .mark_stopped(details.instance_uuid(), 5_000)
        .await
        .unwrap();

    let rows = store.instances().find_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].instance_uuid, details.instance_uuid());
    assert_eq!(rows[0].ts_last_update, 4_000);
    assert_eq!(rows[0].ts_stopped, Some(5_000));
    assert_eq!(store.instances().count_active().await.unwrap(), 0);
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_sweep_queries(pool: PgPool) {
    let store = PgStore::new(pool);
    let now = 1_000_000;
    let fresh = running(now);
    let stale = running(now - 120_000);
    let stopped = InstanceRecord {
        ts_stopped: Some(now - 1_000),
        ..running(now - 2_000)
    };
    for record in [&fresh, &stale, &stopped] {
        store.instances().insert(record).await.unwrap();
    }

    assert_eq!(store.instances().delete_stopped().await.unwrap(), 1);
    assert_eq!(store.instances().delete_stale(now - 60_000).await.unwrap(), 1);
    assert_eq!(store.instances().delete_instance(fresh.instance_uuid).await.unwrap(), 1);
    assert!(store.instances().find_all().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_record_event_deduplicates(pool: PgPool) {
    let store = PgStore::new(pool);
    let event = json!({ "host_name": "web1", "message": "disk full", "severity": "warning" });

    let first = store.issues().record_event(&event, 10).await.unwrap();
    let second = store
        .issues()
        .record_event(&json!({ "host_name": "web1", "message": "disk full", "severity": "critical" }), 20)
        .await
        .unwrap();

    assert_eq!(first.uuid, second.uuid);
    assert_eq!(second.event_count, 2);
    assert_eq!(second.ts_first_event, 10);
    assert_eq!(second.ts_last_modified, 20);
    assert_eq!(second.attributes["severity"], "critical");
    assert_eq!(store.issues().count().await.unwrap(), 1);

    let found = store
        .issues()
        .find_by_checksum(&IssueChecksum::for_event(&event))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.event_count, 2);
}
