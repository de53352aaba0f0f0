//! Store connection lifecycle: lock protocol, retries, heartbeat, schema
//! drift, configuration changes and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracker_domain::{timestamp_with_milliseconds, DbConfig, InstanceRecord, ProcessDetails};
use tracker_store::{MemoryConnector, MemoryStore, StoreConnector};
use tracker_testkit::{db_config, running_record, stale_record, stopped_record, FlakyConnector};
use trackerd::instance_lock;
use trackerd::{
    ConnectError, ConnectionHandle, ConnectionSettings, ConnectionState, DaemonError,
    DaemonResult, EventBus, EventReceiver, StatusEvent, StatusLevel, StoreConnection,
};

struct Running {
    handle: ConnectionHandle,
    events: EventReceiver,
    shutdown: CancellationToken,
    task: JoinHandle<DaemonResult<()>>,
}

impl Running {
    async fn stop(self) -> DaemonResult<()> {
        self.shutdown.cancel();
        self.task.await.unwrap()
    }
}

fn start(connector: Arc<dyn StoreConnector>, config: Option<DbConfig>) -> Running {
    let bus = Arc::new(EventBus::new(1024));
    let events = bus.subscribe();
    let (connection, handle) = StoreConnection::new(
        connector,
        ConnectionSettings::default(),
        ProcessDetails::new("lifecycle-host", 1000, timestamp_with_milliseconds()),
        config,
        bus,
    );
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(connection.run(shutdown.clone()));
    Running {
        handle,
        events,
        shutdown,
        task,
    }
}

fn state(message: &str, level: StatusLevel) -> StatusEvent {
    StatusEvent::state(message, level)
}

#[tokio::test(start_paused = true)]
async fn test_lock_conflict_resolves_when_other_instance_stops() {
    let store = Arc::new(MemoryStore::with_schema(1));
    let other = running_record(timestamp_with_milliseconds());
    store.put_instance(other.clone());
    let mut running = start(Arc::new(MemoryConnector::new(store.clone())), Some(db_config("a")));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(running.handle.state(), ConnectionState::Connecting);
    assert!(running
        .events
        .drain()
        .contains(&state("locked by other instance", StatusLevel::Error)));

    store.put_instance(InstanceRecord {
        ts_stopped: Some(timestamp_with_milliseconds()),
        ..other.clone()
    });
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();

    assert!(store.instance(other.instance_uuid).is_none());
    assert_eq!(store.instance_count(), 1);
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_orphan_sweep_keeps_only_fresh_running_rows() {
    let store = Arc::new(MemoryStore::with_schema(1));
    let now = timestamp_with_milliseconds();
    for _ in 0..2 {
        store.put_instance(stopped_record(now - 5_000));
    }
    for _ in 0..3 {
        store.put_instance(stale_record(now, 120_000));
    }
    let fresh = running_record(now);
    store.put_instance(fresh.clone());

    let running = start(Arc::new(MemoryConnector::new(store.clone())), Some(db_config("a")));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(store.instance_count(), 1);
    assert!(store.instance(fresh.instance_uuid).is_some());
    assert_eq!(running.handle.state(), ConnectionState::Connecting);
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connected_is_noop() {
    let store = Arc::new(MemoryStore::with_schema(1));
    let connector = Arc::new(MemoryConnector::new(store));
    let running = start(connector.clone(), Some(db_config("a")));
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();

    running.handle.connect().await.unwrap();
    running.handle.connect().await.unwrap();

    assert_eq!(connector.open_count(), 1);
    assert_eq!(running.handle.state(), ConnectionState::Connected);
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_twice_is_ok() {
    let store = Arc::new(MemoryStore::with_schema(1));
    let running = start(Arc::new(MemoryConnector::new(store.clone())), Some(db_config("a")));
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();

    running.handle.disconnect().await.unwrap();
    running.handle.disconnect().await.unwrap();

    assert_eq!(running.handle.state(), ConnectionState::Disconnected);
    assert_eq!(store.close_count(), 1);
    let row = store.instance(running.handle.instance_uuid()).unwrap();
    assert!(row.ts_stopped.is_some());
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_disconnects_close_once() {
    let store = Arc::new(MemoryStore::with_schema(1));
    let running = start(Arc::new(MemoryConnector::new(store.clone())), Some(db_config("a")));
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();
    let other = running.handle.clone();

    let (first, second) = tokio::join!(running.handle.disconnect(), other.disconnect());

    first.unwrap();
    second.unwrap();
    assert_eq!(store.close_count(), 1);
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_schema_drift_is_reported_once() {
    let store = Arc::new(MemoryStore::with_schema(5));
    let mut running = start(Arc::new(MemoryConnector::new(store.clone())), Some(db_config("a")));
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();
    assert_eq!(running.handle.startup_schema_version(), Some(5));

    store.set_schema_version(Some(6));
    tokio::time::sleep(Duration::from_secs(46)).await;

    let changes: Vec<StatusEvent> = running
        .events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, StatusEvent::SchemaChange { .. }))
        .collect();
    assert_eq!(changes, vec![StatusEvent::SchemaChange { old: 5, new: 6 }]);
    assert_eq!(running.handle.state(), ConnectionState::Connected);
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_config_change_cancels_pending_retry() {
    let connector = Arc::new(FlakyConnector::new(Arc::new(MemoryStore::with_schema(1))));
    connector.set_unreachable("a", true);
    let mut running = start(connector.clone(), Some(db_config("a")));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(connector.attempts("a") > 1);
    assert!(running
        .events
        .drain()
        .contains(&state("connection failed", StatusLevel::Error)));

    running.handle.config_changed(Some(db_config("b"))).await.unwrap();
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();
    let attempts_a = connector.attempts("a");

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(connector.attempts("a"), attempts_a);
    assert_eq!(connector.attempts("b"), 1);
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_retry_slows_down_after_ten_failures() {
    let connector = Arc::new(FlakyConnector::new(Arc::new(MemoryStore::with_schema(1))));
    connector.set_unreachable("a", true);
    let running = start(connector.clone(), Some(db_config("a")));

    // attempts 1..=11 are 200 ms apart, then 2 s apart
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(connector.attempts("a"), 11);

    tokio::time::sleep(Duration::from_millis(1_800)).await;
    assert_eq!(connector.attempts("a"), 11);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(connector.attempts("a"), 12);

    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_failure_triggers_reconnect() {
    let store = Arc::new(MemoryStore::with_schema(1));
    let connector = Arc::new(FlakyConnector::new(store.clone()));
    let mut running = start(connector.clone(), Some(db_config("a")));
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();
    running.events.drain();

    connector.set_fail_heartbeat(true);
    tokio::time::sleep(Duration::from_secs(4)).await;

    let events = running.events.drain();
    assert!(events.contains(&state("heartbeat failed", StatusLevel::Warning)));
    assert!(events.contains(&state("disconnected", StatusLevel::Info)));
    assert_eq!(running.handle.state(), ConnectionState::Connecting);

    connector.set_fail_heartbeat(false);
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();
    assert!(store.instance(running.handle.instance_uuid()).unwrap().ts_stopped.is_none());
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_reinserts_missing_row() {
    let store = Arc::new(MemoryStore::with_schema(1));
    let running = start(Arc::new(MemoryConnector::new(store.clone())), Some(db_config("a")));
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();

    store.clear();
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert!(store.instance(running.handle.instance_uuid()).is_some());
    assert_eq!(running.handle.state(), ConnectionState::Connected);
    running.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_local_disconnect_is_fatal() {
    let connector = Arc::new(FlakyConnector::new(Arc::new(MemoryStore::with_schema(1))));
    let running = start(connector.clone(), Some(db_config("a")));
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();

    connector.set_fail_close(true);
    let reconnect = running.handle.reconnect().await;

    assert!(matches!(reconnect, Err(DaemonError::LocalDisconnect(_))));
    let outcome = running.task.await.unwrap();
    assert!(matches!(outcome, Err(DaemonError::LocalDisconnect(_))));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_connecting_is_clean() {
    let connector = Arc::new(FlakyConnector::new(Arc::new(MemoryStore::with_schema(1))));
    connector.set_unreachable("a", true);
    let running = start(connector.clone(), Some(db_config("a")));
    tokio::time::sleep(Duration::from_millis(500)).await;

    let handle = running.handle.clone();
    running.stop().await.unwrap();

    assert!(matches!(handle.connect().await, Err(DaemonError::Shutdown)));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_repairs_row_marked_stopped() {
    let store = Arc::new(MemoryStore::with_schema(1));
    let connector = Arc::new(MemoryConnector::new(store.clone()));
    let running = start(connector.clone(), Some(db_config("a")));
    running.handle.wait_for_state(ConnectionState::Connected).await.unwrap();

    let own = running.handle.instance_uuid();
    store.put_instance(InstanceRecord {
        ts_stopped: Some(timestamp_with_milliseconds()),
        ..store.instance(own).unwrap()
    });
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert!(store.instance(own).unwrap().ts_stopped.is_none());
    let other = ProcessDetails::new("other-host", 2000, timestamp_with_milliseconds());
    let second = instance_lock::acquire(connector.as_ref(), &db_config("a"), &other, Duration::from_secs(60)).await;
    assert!(matches!(second, Err(ConnectError::LockConflict { active: 1 })));
    running.stop().await.unwrap();
}
