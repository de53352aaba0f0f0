//! Eventtracker Domain Layer
//!
//! Pure value types shared by the store and the daemon.
//! Nothing in this crate performs I/O.
//!
//! - **Settings**: immutable configuration attached to actions and modifiers
//! - **Event objects**: raw events as JSON values, addressed by dotted paths
//! - **Instance records**: one row per daemon process in `daemon_info`
//! - **Issues**: deduplicated, persisted representation of events
//! - **DbConfig**: connection parameters for the shared store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod db_config;
pub mod error;
pub mod event;
pub mod instance;
pub mod issue;
pub mod settings;

pub use db_config::DbConfig;
pub use error::DomainError;
pub use event::{get_specific_value, set_specific_value};
pub use instance::{timestamp_with_milliseconds, InstanceRecord, InstanceUpdate, ProcessDetails};
pub use issue::{Issue, IssueChecksum, CHECKSUM_FIELDS};
pub use settings::{fill_placeholders, Settings};
