//! Configuration module for the exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Target connection (DSN, session parameters)
//! - Scrape scheduling (interval, timeout)
//! - Enabled scrapers and custom queries

mod app;
mod queries;
mod validation;

pub use app::ExporterConfig;
pub use queries::CustomQueriesConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration, validate_namespace};

// Re-export constants
pub use app::{DEFAULT_SCRAPE_INTERVAL, DEFAULT_SCRAPE_TIMEOUT, MIN_SCRAPE_INTERVAL};
