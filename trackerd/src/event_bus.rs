//! Status stream published by the store connection.
//!
//! The supervisor (and tests) subscribe to a typed event bus instead of
//! registering callbacks on the connection:
//! - `State`: human-readable connection status with a severity
//! - `SchemaChange`: the applied schema moved away from the startup version

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, error, info, warn};

// =============================================================================
// Event Types
// =============================================================================

/// Severity attached to a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLevel::Debug => write!(f, "debug"),
            StatusLevel::Info => write!(f, "info"),
            StatusLevel::Warning => write!(f, "warning"),
            StatusLevel::Error => write!(f, "error"),
        }
    }
}

/// Events that flow from the store connection to its observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Connection status changed ("connecting", "connected", ...)
    State { message: String, level: StatusLevel },

    /// The applied schema version differs from the one seen at connect
    SchemaChange { old: i64, new: i64 },
}

impl StatusEvent {
    /// Build a `State` event.
    pub fn state(message: impl Into<String>, level: StatusLevel) -> Self {
        StatusEvent::State {
            message: message.into(),
            level,
        }
    }

    /// Write this event to the tracing subscriber at its own level.
    pub fn log(&self) {
        match self {
            StatusEvent::State { message, level } => match level {
                StatusLevel::Debug => debug!(status = %message, "Connection status"),
                StatusLevel::Info => info!(status = %message, "Connection status"),
                StatusLevel::Warning => warn!(status = %message, "Connection status"),
                StatusLevel::Error => error!(status = %message, "Connection status"),
            },
            StatusEvent::SchemaChange { old, new } => {
                warn!(
                old_version = old,
                new_version = new,
                "Schema version changed, restart to pick up the new schema"
            )
            },
        }
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Fan-out of status events to any number of subscribers.
///
/// A subscriber that falls more than `capacity` events behind loses the
/// oldest ones and is told how many via `Lagged`.
pub struct EventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    /// Bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; returns how many subscribers will see it.
    pub fn send(&self, event: StatusEvent) -> usize {
        match self.tx.send(event) {
            Ok(delivered) => delivered,
            Err(_unobserved) => 0,
        }
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Current number of subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Events a slow subscriber missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lagged(pub u64);

impl fmt::Display for Lagged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missed {} status events", self.0)
    }
}

/// One subscription to an `EventBus`.
pub struct EventReceiver {
    rx: broadcast::Receiver<StatusEvent>,
}

impl EventReceiver {
    /// Next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Result<StatusEvent, Lagged>> {
        match self.rx.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(RecvError::Lagged(missed)) => Some(Err(Lagged(missed))),
            Err(RecvError::Closed) => None,
        }
    }

    /// Next buffered event, without waiting.
    pub fn try_recv(&mut self) -> Option<Result<StatusEvent, Lagged>> {
        match self.rx.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(TryRecvError::Lagged(missed)) => Some(Err(Lagged(missed))),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    /// Everything currently buffered, skipping lag notices.
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        std::iter::from_fn(|| self.try_recv())
            .filter_map(Result::ok)
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_schema_change_is_logged_once() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            StatusEvent::SchemaChange { old: 1, new: 2 }.log();
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("WARN"));
        assert!(output.contains("Schema version changed"));
    }

    #[tokio::test]
    async fn test_subscriber_sees_published_state() {
        let bus = EventBus::new(4);
        let mut events = bus.subscribe();

        assert_eq!(bus.send(StatusEvent::state("connected", StatusLevel::Info)), 1);

        let received = events.recv().await.unwrap().unwrap();
        assert_eq!(received, StatusEvent::state("connected", StatusLevel::Info));
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_schema_change() {
        let bus = EventBus::new(4);
        let mut supervisor = bus.subscribe();
        let mut api = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.send(StatusEvent::SchemaChange { old: 5, new: 6 });

        for events in [&mut supervisor, &mut api] {
            assert_eq!(
                events.recv().await.unwrap(),
                Ok(StatusEvent::SchemaChange { old: 5, new: 6 })
            );
        }
    }

    #[test]
    fn test_publishing_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);

        assert_eq!(bus.send(StatusEvent::state("connecting", StatusLevel::Info)), 0);
    }

    #[test]
    fn test_slow_subscriber_is_told_it_lagged() {
        let bus = EventBus::new(2);
        let mut events = bus.subscribe();

        for message in ["connecting", "connection failed", "connecting"] {
            bus.send(StatusEvent::state(message, StatusLevel::Info));
        }

        assert_eq!(events.try_recv(), Some(Err(Lagged(1))));
        assert_eq!(events.drain().len(), 2);
        assert!(events.try_recv().is_none());
    }

    #[test]
    fn test_status_event_serializes_tagged() {
        let json = serde_json::to_value(StatusEvent::state("no schema", StatusLevel::Error)).unwrap();

        assert_eq!(json["type"], "state");
        assert_eq!(json["level"], "error");
    }
}
