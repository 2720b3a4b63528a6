//! # Configuration
//!
//! Process-wide configuration, built once at startup and passed explicitly
//! to the components that need it.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults ([`AppConfig::default`])
//! 2. an optional configuration file (TOML, YAML or JSON by extension)
//! 3. environment variables prefixed `RFQ_DISPATCH__`, with `__` separating
//!    nested keys (`RFQ_DISPATCH__DISPATCH__WORKER_COUNT=8`)
//!
//! A `.env` file in the working directory is loaded before the environment
//! is read.
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::config::AppConfig;
//!
//! let config = AppConfig::default();
//! assert_eq!(config.timeline.max_idempotency_key_len, 128);
//! assert!(config.validate().is_ok());
//! ```

use crate::domain::value_objects::{Channel, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "RFQ_DISPATCH";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Dispatch workers.
    pub dispatch: DispatchConfig,
    /// Timeline event log limits.
    pub timeline: TimelineConfig,
    /// Channel transports.
    pub transport: TransportConfig,
    /// PostgreSQL connection.
    pub database: DatabaseConfig,
    /// Logging.
    pub log: LogConfig,
}

impl AppConfig {
    /// Loads configuration from defaults, an optional file and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source is malformed and
    /// `ConfigError::Invalid` if validation fails.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        // A missing .env file is normal outside development.
        let _ = dotenvy::dotenv();

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let loaded: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatch.validate()?;
        self.timeline.validate()?;
        self.transport.validate()?;
        self.database.validate()
    }
}

/// Dispatch worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// Capacity of the attempt queue.
    pub queue_capacity: usize,
    /// Retry bound applied when a send request does not carry one.
    pub default_max_retries: u32,
    /// Queued attempts re-enqueued from storage at startup.
    pub recovery_batch: usize,
    /// Delay before a retry successor is picked up, unless the transport
    /// asked for a longer one.
    pub retry_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1024,
            default_max_retries: 2,
            recovery_batch: 256,
            retry_backoff_ms: 500,
        }
    }
}

impl DispatchConfig {
    /// Sets the number of workers.
    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the default retry bound.
    #[must_use]
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub fn with_retry_backoff_ms(mut self, retry_backoff_ms: u64) -> Self {
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::invalid("dispatch.worker_count must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("dispatch.queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Limits of the timeline event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Maximum `subject_type` length.
    pub max_subject_type_len: usize,
    /// Maximum caller-supplied idempotency key length.
    pub max_idempotency_key_len: usize,
    /// Maximum correlation id length.
    pub max_correlation_id_len: usize,
    /// Maximum comment body length, in characters.
    pub max_comment_len: usize,
    /// Visibility of events emitted by the RFQ state machine and dispatcher.
    pub state_change_visibility: Visibility,
    /// Upper bound on `recent` queries.
    pub recent_limit: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_subject_type_len: 32,
            max_idempotency_key_len: 128,
            max_correlation_id_len: 36,
            max_comment_len: 10_000,
            state_change_visibility: Visibility::Finance,
            recent_limit: 50,
        }
    }
}

impl TimelineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_subject_type_len == 0
            || self.max_idempotency_key_len == 0
            || self.max_correlation_id_len == 0
            || self.max_comment_len == 0
        {
            return Err(ConfigError::invalid("timeline limits must be positive"));
        }
        if self.recent_limit == 0 {
            return Err(ConfigError::invalid("timeline.recent_limit must be at least 1"));
        }
        Ok(())
    }
}

/// Channel transport settings.
///
/// Channels without a webhook endpoint use the simulated transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Webhook URL per channel name.
    pub webhook_endpoints: BTreeMap<String, String>,
    /// Bearer token sent to webhook endpoints.
    pub webhook_token: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            webhook_endpoints: BTreeMap::new(),
            webhook_token: None,
            timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    /// Returns the endpoints keyed by parsed channel.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an unknown channel name.
    pub fn endpoints(&self) -> Result<HashMap<Channel, String>, ConfigError> {
        self.webhook_endpoints
            .iter()
            .map(|(name, url)| {
                name.parse::<Channel>()
                    .map(|channel| (channel, url.clone()))
                    .map_err(|e| ConfigError::invalid(format!("transport.webhook_endpoints: {e}")))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.endpoints()?;
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("transport.timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// PostgreSQL settings. Without a URL the in-memory adapters are used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: Option<String>,
    /// Pool size.
    pub max_connections: u32,
    /// Apply bundled migrations on startup.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_some() && self.max_connections == 0 {
            return Err(ConfigError::invalid("database.max_connections must be at least 1"));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Human-readable logs.
    #[default]
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info,rfq_dispatch=debug".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
