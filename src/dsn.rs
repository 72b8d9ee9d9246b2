//! Connection descriptor.
//!
//! The descriptor is built once from the configured DSN and carries the
//! session parameters every scrape connection must apply.

use std::fmt;

use url::Url;

/// Default MySQL port used when the descriptor names none.
pub const DEFAULT_PORT: u16 = 3306;

/// Session parameter bounding metadata lock waits during a scrape.
pub const LOCK_WAIT_TIMEOUT_PARAM: &str = "lock_wait_timeout";

/// Session parameter keeping scrape queries out of the slow query log.
pub const LOG_SLOW_FILTER_PARAM: &str = "log_slow_filter";

/// Percent-encoded value for [`LOG_SLOW_FILTER_PARAM`].
const LOG_SLOW_FILTER_VALUE: &str = "%27tmp_table_on_disk,filesort_on_disk%27";

/// Query parameters applied as session variables rather than passed to the driver.
const SESSION_PARAMS: &[&str] = &[LOCK_WAIT_TIMEOUT_PARAM, LOG_SLOW_FILTER_PARAM];

/// Immutable, augmented connection string.
///
/// ```
/// use mysqlscrape::ConnectionDescriptor;
///
/// let dsn = ConnectionDescriptor::new("mysql://exporter:secret@db:3306/", 2, false);
/// assert_eq!(dsn.as_str(), "mysql://exporter:secret@db:3306/?lock_wait_timeout=2");
/// assert_eq!(dsn.target(), "db:3306");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    dsn: String,
}

impl ConnectionDescriptor {
    /// Append the lock wait timeout and, when enabled, the slow log filter to `base`.
    pub fn new(base: &str, lock_wait_timeout: u32, log_slow_filter: bool) -> Self {
        let mut params = vec![format!("{LOCK_WAIT_TIMEOUT_PARAM}={lock_wait_timeout}")];
        if log_slow_filter {
            params.push(format!("{LOG_SLOW_FILTER_PARAM}={LOG_SLOW_FILTER_VALUE}"));
        }

        let mut dsn = base.to_string();
        if dsn.contains('?') {
            if !dsn.ends_with('?') && !dsn.ends_with('&') {
                dsn.push('&');
            }
        } else {
            dsn.push('?');
        }
        dsn.push_str(&params.join("&"));

        Self { dsn }
    }

    /// Full augmented string, credentials included.
    pub fn as_str(&self) -> &str {
        &self.dsn
    }

    /// `host:port` of the target; never contains credentials.
    ///
    /// Returns an empty string when the descriptor cannot be parsed.
    pub fn target(&self) -> String {
        match self.parse() {
            Ok(url) => {
                let host = url.host_str().unwrap_or("localhost");
                format!("{}:{}", host, url.port().unwrap_or(DEFAULT_PORT))
            }
            Err(e) => {
                tracing::error!(error = %e, "Error parsing DSN");
                String::new()
            }
        }
    }

    /// Session variables carried as query parameters, percent-decoded.
    pub fn session_variables(&self) -> Result<Vec<(String, String)>, url::ParseError> {
        Ok(self
            .parse()?
            .query_pairs()
            .filter(|(key, _)| is_session_param(key))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect())
    }

    /// The descriptor with session parameters removed, for the driver.
    pub fn driver_url(&self) -> Result<String, url::ParseError> {
        let mut url = self.parse()?;
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_session_param(key))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        if retained.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(retained);
        }
        Ok(url.into())
    }

    fn parse(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.dsn)
    }
}

fn is_session_param(key: &str) -> bool {
    SESSION_PARAMS.contains(&key)
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("target", &self.target())
            .finish_non_exhaustive()
    }
}
