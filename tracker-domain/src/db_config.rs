//! Connection parameters for the shared store.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::DomainError;

fn default_port() -> u16 {
    5432
}

fn default_application_name() -> String {
    "eventtracker".to_string()
}

/// Database resource configuration.
///
/// Deserializes from the same JSON document the config file holds.
/// The password is zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Server host
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database name
    #[serde(alias = "dbname")]
    pub database: String,
    /// Login user
    pub username: String,
    /// Login password
    #[serde(default, with = "secret")]
    pub password: Zeroizing<String>,
    /// PostgreSQL sslmode (disable, prefer, require, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sslmode: Option<String>,
    /// Reported to the server as application_name
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl DbConfig {
    /// Create a configuration with default port and application name.
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            database: database.into(),
            username: username.into(),
            password: Zeroizing::new(password.into()),
            sslmode: None,
            application_name: default_application_name(),
        }
    }

    /// Reject configurations that cannot possibly connect.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.host.trim().is_empty() {
            return Err(DomainError::InvalidConfig("host is empty".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(DomainError::InvalidConfig("database is empty".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(DomainError::InvalidConfig("username is empty".to_string()));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DomainError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render a `postgres://` connection URL.
    pub fn to_url(&self) -> String {
        let mut url = format!(
            "postgres://{}:{}@{}:{}/{}?application_name={}",
            encode_component(&self.username),
            encode_component(&self.password),
            self.host,
            self.port,
            encode_component(&self.database),
            encode_component(&self.application_name),
        );
        if let Some(sslmode) = &self.sslmode {
            url.push_str("&sslmode=");
            url.push_str(&encode_component(sslmode));
        }
        url
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sslmode", &self.sslmode)
            .field("application_name", &self.application_name)
            .finish()
    }
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

mod secret {
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    pub fn serialize<S: Serializer>(value: &Zeroizing<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Zeroizing<String>, D::Error> {
        String::deserialize(deserializer).map(Zeroizing::new)
    }
}
