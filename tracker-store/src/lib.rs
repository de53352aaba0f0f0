//! Eventtracker Storage Layer
//!
//! Persistence for daemon instance records and issues.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **Connector**: Opens a store handle from `DbConfig`
//! - **In-memory store**: Fast implementation for testing
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tracker_domain::{DbConfig, ProcessDetails};
//! use tracker_store::{MemoryConnector, MemoryStore, StoreConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let shared = Arc::new(MemoryStore::with_schema(1));
//!     let connector = MemoryConnector::new(shared);
//!
//!     let store = connector
//!         .open(&DbConfig::new("localhost", "eventtracker", "et", ""))
//!         .await
//!         .unwrap();
//!
//!     let details = ProcessDetails::new("localhost", 1, 0);
//!     store.instances().insert(&details.properties_to_insert(0)).await.unwrap();
//!     assert_eq!(store.instances().count_active().await.unwrap(), 1);
//! }
//! ```

#![warn(clippy::all)]

mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

pub use error::StoreError;
pub use memory::{MemoryConnector, MemoryStore};
#[cfg(feature = "postgres")]
pub use postgres::{PgConnector, PgStore};
pub use repository::{
    InstanceRepository, IssueRepository, SchemaCheck, Store, StoreConnector, StoreHandle,
};
