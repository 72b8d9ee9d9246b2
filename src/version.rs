//! Target version detection.
//!
//! The detected version gates which scrapers run. When the version cannot be
//! determined detection yields [`ServerVersion::UNKNOWN`], which every
//! scraper accepts.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;

/// Query returning the server version string.
pub const VERSION_QUERY: &str = "SELECT @@version";

/// Numeric capability level of the target (`major.minor`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ServerVersion(f64);

impl ServerVersion {
    /// Sentinel above any real version.
    pub const UNKNOWN: ServerVersion = ServerVersion(999.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    /// Whether a scraper requiring `min_version` may run against this target.
    pub fn satisfies(self, min_version: f64) -> bool {
        self.0 >= min_version
    }

    /// Parse the leading `major.minor` of a version string.
    ///
    /// Unparsable strings and a zero version map to [`Self::UNKNOWN`].
    ///
    /// ```
    /// use mysqlscrape::ServerVersion;
    ///
    /// assert_eq!(ServerVersion::parse("8.0.36-log").value(), 8.0);
    /// assert_eq!(ServerVersion::parse("10.11.6-MariaDB").value(), 10.11);
    /// assert!(ServerVersion::parse("unknown").is_unknown());
    /// ```
    pub fn parse(version: &str) -> Self {
        static VERSION_RE: OnceLock<Regex> = OnceLock::new();
        let re = VERSION_RE
            .get_or_init(|| Regex::new(r"^\d+\.\d+").expect("failed to compile version regex"));

        re.find(version.trim())
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|v| *v != 0.0)
            .map(Self)
            .unwrap_or(Self::UNKNOWN)
    }

    /// Query the target and parse its version.
    ///
    /// Never fails: query errors and cancellation yield [`Self::UNKNOWN`].
    pub async fn detect<C: Connection + ?Sized>(token: &CancellationToken, conn: &C) -> Self {
        let queried = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!("Version query cancelled");
                return Self::UNKNOWN;
            }
            queried = conn.query_scalar(VERSION_QUERY) => queried,
        };

        match queried {
            Ok(version) => {
                let parsed = Self::parse(&version);
                if parsed.is_unknown() {
                    tracing::debug!(version = %version, "Error parsing version string");
                }
                parsed
            }
            Err(e) => {
                tracing::debug!(error = %e, "Error querying version");
                Self::UNKNOWN
            }
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            f.write_str("unknown")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VersionConn(Result<&'static str, &'static str>);

    #[async_trait::async_trait]
    impl Connection for VersionConn {
        async fn ping(&self) -> Result<(), sqlx::Error> {
            Ok(())
        }

        async fn query_scalar(&self, sql: &str) -> Result<String, sqlx::Error> {
            assert_eq!(sql, VERSION_QUERY);
            self.0
                .map(str::to_string)
                .map_err(|e| sqlx::Error::Protocol(e.to_string()))
        }

        async fn close(&self) {}
    }

    #[test]
    fn test_parse_versions() {
        assert_eq!(ServerVersion::parse("5.7.44").value(), 5.7);
        assert_eq!(ServerVersion::parse("5.6.51-91.0-log").value(), 5.6);
        assert_eq!(ServerVersion::parse(" 8.4.0").value(), 8.4);
    }

    #[test]
    fn test_parse_falls_back_to_sentinel() {
        assert!(ServerVersion::parse("").is_unknown());
        assert!(ServerVersion::parse("v8.0").is_unknown());
        assert!(ServerVersion::parse("8").is_unknown());
        assert!(ServerVersion::parse("0.0.1").is_unknown());
    }

    #[test]
    fn test_sentinel_satisfies_everything() {
        assert!(ServerVersion::UNKNOWN.satisfies(8.4));
        assert!(ServerVersion::UNKNOWN.satisfies(100.0));
        assert!(ServerVersion::new(5.7).satisfies(5.6));
        assert!(ServerVersion::new(5.7).satisfies(5.7));
        assert!(!ServerVersion::new(5.6).satisfies(5.7));
        assert_eq!(ServerVersion::UNKNOWN.to_string(), "unknown");
        assert_eq!(ServerVersion::new(8.0).to_string(), "8");
    }

    #[tokio::test]
    async fn test_detect_parses_result() {
        let version = ServerVersion::detect(&CancellationToken::new(), &VersionConn(Ok("8.0.36"))).await;
        assert_eq!(version.value(), 8.0);
    }

    #[tokio::test]
    async fn test_detect_query_error_yields_sentinel() {
        let version =
            ServerVersion::detect(&CancellationToken::new(), &VersionConn(Err("denied"))).await;
        assert!(version.is_unknown());
    }

    #[tokio::test]
    async fn test_detect_cancelled_yields_sentinel() {
        let token = CancellationToken::new();
        token.cancel();
        let version = ServerVersion::detect(&token, &VersionConn(Ok("5.7.1"))).await;
        assert!(version.is_unknown());
    }
}
