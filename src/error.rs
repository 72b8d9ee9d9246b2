//! Error types for the scrape cycle.
//!
//! Only [`ExporterError`] ever escapes a cycle. [`ScrapeError`] is contained
//! per scraper and turned into a `success = 0` sample.

use thiserror::Error;

/// Cycle-fatal errors: the target could not be reached.
///
/// Every variant carries the target address only, never credentials.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// The connection could not be opened.
    #[error("cannot open connection to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    /// The connection opened but the liveness check failed.
    #[error("cannot ping mysql {target}: {source}")]
    Ping {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    /// The cycle was cancelled before a live connection was obtained.
    #[error("connection to {target} cancelled")]
    Cancelled { target: String },
}

impl ExporterError {
    /// Address of the target the failure refers to.
    pub fn target(&self) -> &str {
        match self {
            Self::Connect { target, .. } | Self::Ping { target, .. } | Self::Cancelled { target } => {
                target
            }
        }
    }
}

/// Errors a scraper may return from a single scrape.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Query against the target failed.
    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),

    /// The cycle's cancellation token fired.
    #[error("scrape cancelled")]
    Cancelled,

    /// The scraper panicked.
    #[error("scraper panicked: {0}")]
    Panicked(String),

    /// Any other scraper-specific failure.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_error_message_has_target_only() {
        let err = ExporterError::Ping {
            target: "db:3306".to_string(),
            source: sqlx::Error::PoolTimedOut,
        };
        assert_eq!(err.target(), "db:3306");
        assert!(err.to_string().starts_with("cannot ping mysql db:3306"));
    }

    #[test]
    fn test_scrape_error_from_sqlx() {
        let err: ScrapeError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ScrapeError::Query(_)));
        assert!(err.to_string().starts_with("query error"));
    }
}
