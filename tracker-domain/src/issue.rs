//! Issues: deduplicated, persisted events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::event::get_specific_value;

/// Event fields that identify "the same problem" across events.
pub const CHECKSUM_FIELDS: [&str; 5] = [
    "host_name",
    "object_name",
    "object_class",
    "sender_event_id",
    "message",
];

/// SHA-256 over the identifying fields of an event, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueChecksum(String);

impl IssueChecksum {
    /// Compute the checksum of an event object.
    ///
    /// Missing fields hash as empty strings; fields are separated
    /// by a NUL byte so adjacent values cannot collide.
    pub fn for_event(event: &Value) -> Self {
        let mut hasher = Sha256::new();
        for field in CHECKSUM_FIELDS {
            let part = match get_specific_value(event, field) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a checksum read back from storage.
    pub fn from_stored(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deduplicated issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue id
    pub uuid: Uuid,
    /// Deduplication key
    pub checksum: IssueChecksum,
    /// Latest transformed event
    pub attributes: Value,
    /// Events folded into this issue
    pub event_count: u64,
    /// First seen (ms epoch)
    pub ts_first_event: i64,
    /// Last seen (ms epoch)
    pub ts_last_modified: i64,
}

impl Issue {
    /// Create an issue from its first event.
    pub fn from_event(event: Value, now: i64) -> Self {
        Self {
            uuid: Uuid::now_v7(),
            checksum: IssueChecksum::for_event(&event),
            attributes: event,
            event_count: 1,
            ts_first_event: now,
            ts_last_modified: now,
        }
    }

    /// Fold a repeated event into this issue.
    pub fn refresh(&mut self, event: Value, now: i64) {
        self.attributes = event;
        self.event_count += 1;
        self.ts_last_modified = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checksum_ignores_unrelated_fields() {
        let a = json!({ "host_name": "web1", "message": "down", "severity": "critical" });
        let b = json!({ "host_name": "web1", "message": "down", "severity": "warning" });

        assert_eq!(IssueChecksum::for_event(&a), IssueChecksum::for_event(&b));
    }

    #[test]
    fn test_checksum_separates_fields() {
        let a = json!({ "host_name": "ab", "object_name": "c" });
        let b = json!({ "host_name": "a", "object_name": "bc" });

        assert_ne!(IssueChecksum::for_event(&a), IssueChecksum::for_event(&b));
        assert_eq!(IssueChecksum::for_event(&a).as_str().len(), 64);
    }

    #[test]
    fn test_refresh_counts_events() {
        let mut issue = Issue::from_event(json!({ "message": "down" }), 10);
        issue.refresh(json!({ "message": "down", "extra": 1 }), 20);

        assert_eq!(issue.event_count, 2);
        assert_eq!(issue.ts_first_event, 10);
        assert_eq!(issue.ts_last_modified, 20);
        assert_eq!(issue.attributes["extra"], json!(1));
    }
}
