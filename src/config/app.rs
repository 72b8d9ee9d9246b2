//! Exporter configuration structures.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::custom_query::CustomQuery;
use crate::exporter::{DEFAULT_LOCK_WAIT_TIMEOUT, DEFAULT_NAMESPACE};
use crate::scraper::BUILTIN_SCRAPERS;

use super::queries::CustomQueriesConfig;
use super::validation::{ConfigError, expand_env_vars, validate_namespace};

// =============================================================================
// Constants
// =============================================================================

/// Default interval between scrape cycles (15 seconds).
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(15);

/// Default budget for a single cycle (10 seconds).
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum allowed scrape interval (1 second).
pub const MIN_SCRAPE_INTERVAL: Duration = Duration::from_secs(1);

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_lock_wait_timeout() -> u32 {
    DEFAULT_LOCK_WAIT_TIMEOUT
}

fn default_scrape_interval() -> Duration {
    DEFAULT_SCRAPE_INTERVAL
}

fn default_scrape_timeout() -> Duration {
    DEFAULT_SCRAPE_TIMEOUT
}

fn default_scrapers() -> Vec<String> {
    BUILTIN_SCRAPERS.iter().map(|s| (*s).to_string()).collect()
}

// =============================================================================
// Exporter Configuration
// =============================================================================

/// Top-level exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Target connection string; `${VAR}` and `${VAR:-default}` are expanded.
    /// May be left out when the DSN comes from the command line.
    #[serde(default)]
    pub dsn: String,

    /// Metric namespace (default: "mysql").
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// `lock_wait_timeout` session value in seconds (default: 2).
    #[serde(default = "default_lock_wait_timeout")]
    pub lock_wait_timeout: u32,

    /// Add a `log_slow_filter` to keep scrapes out of the slow log (default: false).
    #[serde(default)]
    pub log_slow_filter: bool,

    /// Interval between cycles (default: 15s, minimum: 1s).
    #[serde(default = "default_scrape_interval", with = "humantime_serde")]
    pub scrape_interval: Duration,

    /// Cancellation deadline of a single cycle (default: 10s).
    #[serde(default = "default_scrape_timeout", with = "humantime_serde")]
    pub scrape_timeout: Duration,

    /// Built-in scrapers to enable, in order (default: all).
    #[serde(default = "default_scrapers")]
    pub scrapers: Vec<String>,

    /// Custom queries run after the scrapers.
    #[serde(default)]
    pub custom_queries: Vec<CustomQuery>,

    /// Directory with additional custom query YAML files.
    #[serde(default)]
    pub custom_query_path: Option<String>,
}

impl ExporterConfig {
    /// Configuration with defaults for everything but the DSN.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            namespace: default_namespace(),
            lock_wait_timeout: DEFAULT_LOCK_WAIT_TIMEOUT,
            log_slow_filter: false,
            scrape_interval: DEFAULT_SCRAPE_INTERVAL,
            scrape_timeout: DEFAULT_SCRAPE_TIMEOUT,
            scrapers: default_scrapers(),
            custom_queries: Vec::new(),
            custom_query_path: None,
        }
    }

    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a YAML file without validating it.
    ///
    /// Queries found under `custom_query_path` are merged in. Callers applying
    /// overrides must call [`validate`](Self::validate) afterwards.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_yaml(&content)?;

        if let Some(ref query_dir) = config.custom_query_path {
            let additional = CustomQueriesConfig::load_from_dir(query_dir)?;
            config.custom_queries.extend(additional.queries);
        }

        Ok(config)
    }

    /// Replace the DSN, expanding environment variables like the file value.
    pub fn set_dsn(&mut self, dsn: &str) {
        self.dsn = expand_env_vars(dsn);
    }

    /// Parse YAML and expand environment variables in the DSN.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.dsn = expand_env_vars(&config.dsn);
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dsn.trim().is_empty() {
            return Err(ConfigError::ValidationError("dsn cannot be empty".to_string()));
        }
        // The DSN may carry credentials, so it is never echoed back.
        url::Url::parse(&self.dsn)
            .map_err(|e| ConfigError::ValidationError(format!("invalid dsn: {}", e)))?;

        validate_namespace(&self.namespace)?;

        if self.lock_wait_timeout == 0 {
            return Err(ConfigError::ValidationError(
                "lock_wait_timeout must be positive".to_string(),
            ));
        }

        if self.scrape_interval < MIN_SCRAPE_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "scrape_interval must be at least {:?}",
                MIN_SCRAPE_INTERVAL
            )));
        }

        if self.scrape_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "scrape_timeout must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.scrapers {
            if !BUILTIN_SCRAPERS.contains(&name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "unknown scraper: '{}' (available: {})",
                    name,
                    BUILTIN_SCRAPERS.join(", ")
                )));
            }
            if !seen.insert(name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate scraper: '{}'",
                    name
                )));
            }
        }

        CustomQueriesConfig {
            queries: self.custom_queries.clone(),
        }
        .validate()?;

        Ok(())
    }
}
