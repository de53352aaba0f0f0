//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracker_domain::DbConfig;

use crate::connection::ConnectionSettings;
use crate::error::{DaemonError, DaemonResult};
use crate::retry::RetryPolicy;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Static connection parameters, used when no config file is watched
    pub db: Option<DbConfig>,

    /// JSON file with connection parameters, watched for changes
    pub db_config_file: Option<PathBuf>,

    /// JSON file declaring actions and modifiers
    pub pipeline_file: Option<PathBuf>,

    /// Periods and thresholds of the connection
    pub timing: TimingConfig,

    /// Emit logs as JSON
    pub log_json: bool,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Connection timing.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingConfig {
    /// Own-row heartbeat period
    pub heartbeat: Duration,
    /// Schema drift check period
    pub schema_check: Duration,
    /// Age after which a running row is presumed dead
    pub stale_after: Duration,
    /// Base connect retry interval
    pub retry_interval: Duration,
    /// Consecutive failures before the retry interval slows down
    pub retry_slowdown_after: u32,
    /// Multiplier applied to the retry interval after the slowdown
    pub retry_slowdown_factor: u32,
    /// Config file poll period
    pub config_poll: Duration,
    /// Bound on each component's shutdown (`None`: wait forever)
    pub component_stop_timeout: Option<Duration>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(3),
            schema_check: Duration::from_secs(15),
            stale_after: Duration::from_secs(60),
            retry_interval: Duration::from_millis(200),
            retry_slowdown_after: 10,
            retry_slowdown_factor: 10,
            config_poll: Duration::from_secs(5),
            component_stop_timeout: None,
        }
    }
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> DaemonResult<Self> {
        let config = Self {
            environment: load_environment(&var)?,
            api: load_api_config(&var)?,
            db: load_db_config(&var)?,
            db_config_file: var("TRACKER_DB_CONFIG_FILE").map(PathBuf::from),
            pipeline_file: var("TRACKER_PIPELINE_FILE").map(PathBuf::from),
            timing: load_timing_config(&var)?,
            log_json: matches!(
                var("TRACKER_LOG_JSON").as_deref(),
                Some("1" | "true" | "yes")
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            db: None,
            db_config_file: None,
            pipeline_file: None,
            timing: TimingConfig {
                config_poll: Duration::from_secs(1),
                component_stop_timeout: Some(Duration::from_secs(5)),
                ..TimingConfig::default()
            },
            log_json: false,
            environment: Environment::Test,
        }
    }

    /// Reject timing that would break the instance lock.
    pub fn validate(&self) -> DaemonResult<()> {
        let timing = &self.timing;
        for (name, period) in [
            ("TRACKER_HEARTBEAT_SECS", timing.heartbeat),
            ("TRACKER_SCHEMA_CHECK_SECS", timing.schema_check),
            ("TRACKER_RETRY_INTERVAL_MS", timing.retry_interval),
            ("TRACKER_CONFIG_POLL_SECS", timing.config_poll),
        ] {
            if period.is_zero() {
                return Err(DaemonError::Config(format!("{} must be greater than zero", name)));
            }
        }
        if timing.stale_after <= timing.heartbeat {
            return Err(DaemonError::Config(format!(
                "TRACKER_STALE_AFTER_SECS ({}s) must exceed TRACKER_HEARTBEAT_SECS ({}s)",
                timing.stale_after.as_secs(),
                timing.heartbeat.as_secs()
            )));
        }
        if timing.retry_slowdown_factor == 0 {
            return Err(DaemonError::Config(
                "TRACKER_RETRY_SLOWDOWN_FACTOR must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for the store connection.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            heartbeat: self.timing.heartbeat,
            schema_check: self.timing.schema_check,
            stale_after: self.timing.stale_after,
            retry: RetryPolicy::new(
                self.timing.retry_interval,
                self.timing.retry_slowdown_after,
                self.timing.retry_slowdown_factor,
            ),
            component_stop_timeout: self.timing.component_stop_timeout,
        }
    }
}

fn load_environment(var: &impl Fn(&str) -> Option<String>) -> DaemonResult<Environment> {
    let env_str = var("TRACKER_ENV").unwrap_or_else(|| "development".to_string());

    match env_str.to_lowercase().as_str() {
        "test" => Ok(Environment::Test),
        "development" | "dev" => Ok(Environment::Development),
        "production" | "prod" => Ok(Environment::Production),
        other => Err(DaemonError::Config(format!(
            "Invalid TRACKER_ENV: {}. Expected: test, development, production",
            other
        ))),
    }
}

fn load_api_config(var: &impl Fn(&str) -> Option<String>) -> DaemonResult<ApiConfig> {
    let host = var("TRACKER_API_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let port = parse_or(var, "TRACKER_API_PORT", 8089u16)?;

    Ok(ApiConfig { host, port })
}

fn load_db_config(var: &impl Fn(&str) -> Option<String>) -> DaemonResult<Option<DbConfig>> {
    let Some(host) = var("TRACKER_DB_HOST") else {
        return Ok(None);
    };
    let database = var("TRACKER_DB_NAME")
        .ok_or_else(|| DaemonError::Config("TRACKER_DB_NAME is required with TRACKER_DB_HOST".to_string()))?;
    let username = var("TRACKER_DB_USER")
        .ok_or_else(|| DaemonError::Config("TRACKER_DB_USER is required with TRACKER_DB_HOST".to_string()))?;
    let password = var("TRACKER_DB_PASSWORD").unwrap_or_default();

    let mut db = DbConfig::new(host, database, username, password);
    db.port = parse_or(var, "TRACKER_DB_PORT", db.port)?;
    db.validate()?;
    Ok(Some(db))
}

fn load_timing_config(var: &impl Fn(&str) -> Option<String>) -> DaemonResult<TimingConfig> {
    let defaults = TimingConfig::default();

    Ok(TimingConfig {
        heartbeat: secs_or(var, "TRACKER_HEARTBEAT_SECS", defaults.heartbeat)?,
        schema_check: secs_or(var, "TRACKER_SCHEMA_CHECK_SECS", defaults.schema_check)?,
        stale_after: secs_or(var, "TRACKER_STALE_AFTER_SECS", defaults.stale_after)?,
        retry_interval: Duration::from_millis(parse_or(
            var,
            "TRACKER_RETRY_INTERVAL_MS",
            200u64,
        )?),
        retry_slowdown_after: parse_or(var, "TRACKER_RETRY_SLOWDOWN_AFTER", defaults.retry_slowdown_after)?,
        retry_slowdown_factor: parse_or(
            var,
            "TRACKER_RETRY_SLOWDOWN_FACTOR",
            defaults.retry_slowdown_factor,
        )?,
        config_poll: secs_or(var, "TRACKER_CONFIG_POLL_SECS", defaults.config_poll)?,
        component_stop_timeout: match var("TRACKER_COMPONENT_STOP_TIMEOUT_SECS") {
            Some(value) => Some(Duration::from_secs(parse_value(
                "TRACKER_COMPONENT_STOP_TIMEOUT_SECS",
                &value,
            )?)),
            None => None,
        },
    })
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> DaemonResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, value)))
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> DaemonResult<T> {
    match var(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn secs_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> DaemonResult<Duration> {
    parse_or(var, key, default.as_secs()).map(Duration::from_secs)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8089,
            },
            db: None,
            db_config_file: None,
            pipeline_file: None,
            timing: TimingConfig::default(),
            log_json: false,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
