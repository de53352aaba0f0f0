//! Test helpers for eventtracker daemon tests.
//!
//! Provides a fault-injecting store connector and record/event fixtures.
//! Everything here runs against `MemoryStore`; PostgreSQL tests use
//! `#[sqlx::test]` directly.

mod helpers;

pub use helpers::{
    db_config, running_record, sample_event, stale_record, stopped_record, FlakyConnector,
    FlakyStore,
};
