//! Storage layer errors

use thiserror::Error;

/// Failures of a store handle or connector.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique key already taken
    #[error("Duplicate {table} row: {key}")]
    Duplicate {
        /// Table the insert targeted
        table: &'static str,
        /// Conflicting key
        key: String,
    },

    /// Stored value could not be mapped to a domain type
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Query failed
    #[error("Database error: {0}")]
    Database(String),

    /// Handle could not be opened or was lost
    #[error("Connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// Unique key violation on `table`.
    pub fn duplicate(table: &'static str, key: impl Into<String>) -> Self {
        Self::Duplicate {
            table,
            key: key.into(),
        }
    }

    /// Whether the handle itself is unusable (as opposed to one bad query).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Duplicate {
                    table: "unknown",
                    key: db_err.constraint().unwrap_or("unknown").to_string(),
                }
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => StoreError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(err.to_string())
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}
