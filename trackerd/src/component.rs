//! Dependent-component protocol.
//!
//! Components that need the store register with the connection. They are
//! told when a handle becomes available and asked to release it before the
//! connection closes it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, error, warn};
use tracker_store::StoreHandle;

use crate::error::{DaemonError, DaemonResult};

/// A subsystem that works against the store while the daemon is connected.
#[async_trait]
pub trait DbComponent: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called once per successful connection.
    async fn init_db(&self, store: StoreHandle) -> DaemonResult<()>;

    /// Called once per disconnect. Must resolve only after every clone of
    /// the handle received in `init_db` has been dropped.
    async fn stop_db(&self) -> DaemonResult<()>;
}

/// Hand a fresh store to every component. Failures are logged, not fatal.
pub async fn init_all(components: &[Arc<dyn DbComponent>], store: &StoreHandle) {
    for component in components {
        match component.init_db(store.clone()).await {
            Ok(()) => debug!(component = component.name(), "Component initialized"),
            Err(e) => error!(component = component.name(), error = %e, "Component failed to initialize"),
        }
    }
}

/// Ask every component to release the store and wait for all of them.
///
/// Without a timeout this waits as long as the slowest component takes.
/// With one, a component that misses it is reported as `ComponentStop` and
/// the wait continues with the others. Returns the failures.
pub async fn stop_all(
    components: &[Arc<dyn DbComponent>],
    timeout: Option<Duration>,
) -> Vec<DaemonError> {
    let stops = components.iter().map(|component| async move {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, component.stop_db()).await {
                Ok(result) => result,
                Err(_) => Err(DaemonError::ComponentStop {
                    component: component.name().to_string(),
                    message: format!("did not stop within {:?}", limit),
                }),
            },
            None => component.stop_db().await,
        };
        result.map_err(|e| match e {
            DaemonError::ComponentStop { .. } => e,
            other => DaemonError::ComponentStop {
                component: component.name().to_string(),
                message: other.to_string(),
            },
        })
    });

    let failures: Vec<DaemonError> = join_all(stops)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();

    for failure in &failures {
        warn!(error = %failure, "Component stop failed");
    }
    failures
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    struct SlowComponent {
        name: String,
        delay: Duration,
        fail: bool,
        stopped: AtomicUsize,
    }

    impl SlowComponent {
        fn new(name: &str, delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                delay,
                fail,
                stopped: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DbComponent for SlowComponent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn init_db(&self, _store: StoreHandle) -> DaemonResult<()> {
            Ok(())
        }

        async fn stop_db(&self) -> DaemonResult<()> {
            tokio::time::sleep(self.delay).await;
            self.stopped.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DaemonError::Action("still busy".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_waits_for_every_component() {
        let fast = SlowComponent::new("fast", Duration::from_secs(1), false);
        let slow = SlowComponent::new("slow", Duration::from_secs(30), false);
        let components: Vec<Arc<dyn DbComponent>> = vec![fast.clone(), slow.clone()];
        let started = Instant::now();

        let failures = stop_all(&components, None).await;

        assert!(failures.is_empty());
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(fast.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(slow.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_reports_timeouts_and_errors() {
        let hung = SlowComponent::new("hung", Duration::from_secs(3_600), false);
        let broken = SlowComponent::new("broken", Duration::ZERO, true);
        let components: Vec<Arc<dyn DbComponent>> = vec![hung, broken];

        let failures = stop_all(&components, Some(Duration::from_secs(5))).await;

        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| matches!(f, DaemonError::ComponentStop { .. })));
    }
}
