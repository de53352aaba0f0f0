//! Domain errors.

/// Errors raised while building or validating domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// A required setting is missing
    #[error("Missing setting: {0}")]
    MissingSetting(String),

    /// A setting has the wrong type or an unusable value
    #[error("Invalid setting {key}: {message}")]
    InvalidSetting {
        /// Setting key
        key: String,
        /// What is wrong with it
        message: String,
    },

    /// Settings could not be (de)serialized
    #[error("Settings serialization error: {0}")]
    Serialization(String),

    /// A dotted property path cannot be written
    #[error("Invalid property path: {0}")]
    InvalidPath(String),

    /// Connection parameters are incomplete or malformed
    #[error("Invalid DB configuration: {0}")]
    InvalidConfig(String),
}

impl DomainError {
    /// Create an invalid setting error
    pub fn invalid_setting(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            message: message.into(),
        }
    }
}
