//! MySQL backend implementation using sqlx.
//!
//! Provides the single-connection pool used by every scrape cycle.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::Executor;
use sqlx::Row;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};

use crate::ConnectionDescriptor;
use crate::connection::{CONNECTION_MAX_LIFETIME, Connection, Connector, MAX_OPEN_CONNECTIONS};

/// Default time a query waits for the pooled connection.
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens [`MySqlHandle`]s.
///
/// The descriptor's session parameters (`lock_wait_timeout`, `log_slow_filter`)
/// are applied with `SET SESSION` on every new physical connection; values are
/// passed through verbatim.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    acquire_timeout: Duration,
}

impl Default for MySqlConnector {
    fn default() -> Self {
        Self {
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl MySqlConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how long a query may wait for the pooled connection.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlHandle;

    /// Build a lazy pool; the first ping opens the physical connection.
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<MySqlHandle, sqlx::Error> {
        let url = descriptor
            .driver_url()
            .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;
        let options = MySqlConnectOptions::from_str(&url)?;

        let statements: Arc<Vec<String>> = Arc::new(
            descriptor
                .session_variables()
                .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?
                .into_iter()
                .map(|(name, value)| format!("SET SESSION {name} = {value}"))
                .collect(),
        );

        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_OPEN_CONNECTIONS)
            .min_connections(0)
            .max_lifetime(CONNECTION_MAX_LIFETIME)
            .acquire_timeout(self.acquire_timeout)
            .after_connect(move |conn, _meta| {
                let statements = Arc::clone(&statements);
                Box::pin(async move {
                    for statement in statements.iter() {
                        (&mut *conn).execute(statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_lazy_with(options);

        Ok(MySqlHandle { pool })
    }
}

/// Handle to a MySQL target backed by a one-connection pool.
///
/// Clones share the pool; concurrent queries wait for the single connection.
#[derive(Clone)]
pub struct MySqlHandle {
    pool: MySqlPool,
}

impl fmt::Debug for MySqlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlHandle").finish_non_exhaustive()
    }
}

impl MySqlHandle {
    /// Underlying sqlx pool for direct query execution.
    #[inline]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Run `sql` and return every row.
    pub async fn fetch_all(&self, sql: &str) -> Result<Vec<MySqlRow>, sqlx::Error> {
        sqlx::query(sql).fetch_all(&self.pool).await
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[async_trait::async_trait]
impl Connection for MySqlHandle {
    async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::Connection::ping(&mut *conn).await
    }

    async fn query_scalar(&self, sql: &str) -> Result<String, sqlx::Error> {
        let row = sqlx::query(sql).fetch_one(&self.pool).await?;
        column_text(&row, 0).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "0".to_string(),
            source: "value is NULL or not text".into(),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Read column `index` as text, accepting binary-collated values.
pub fn column_text(row: &MySqlRow, index: usize) -> Option<String> {
    row.try_get::<String, _>(index)
        .ok()
        .or_else(|| {
            row.try_get::<Vec<u8>, _>(index)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

/// Read column `index` as a number.
///
/// Numeric columns decode directly; text columns are parsed, with
/// `ON`/`YES` mapped to 1 and `OFF`/`NO` to 0.
pub fn column_f64(row: &MySqlRow, index: usize) -> Option<f64> {
    row.try_get::<f64, _>(index)
        .ok()
        .or_else(|| row.try_get::<i64, _>(index).ok().map(|v| v as f64))
        .or_else(|| row.try_get::<u64, _>(index).ok().map(|v| v as f64))
        .or_else(|| row.try_get::<f32, _>(index).ok().map(f64::from))
        .or_else(|| column_text(row, index).and_then(|text| parse_numeric(&text)))
}

/// Parse a textual status or variable value.
///
/// ```
/// use mysqlscrape::connection::parse_numeric;
///
/// assert_eq!(parse_numeric("42"), Some(42.0));
/// assert_eq!(parse_numeric("ON"), Some(1.0));
/// assert_eq!(parse_numeric("utf8mb4"), None);
/// ```
pub fn parse_numeric(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<f64>() {
        return value.is_finite().then_some(value);
    }
    match text.to_ascii_uppercase().as_str() {
        "ON" | "YES" | "TRUE" => Some(1.0),
        "OFF" | "NO" | "FALSE" => Some(0.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric(" 12.5 "), Some(12.5));
        assert_eq!(parse_numeric("off"), Some(0.0));
        assert_eq!(parse_numeric("Yes"), Some(1.0));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric("/var/lib/mysql"), None);
    }

    #[tokio::test]
    async fn test_open_is_lazy() {
        let connector = MySqlConnector::new().with_acquire_timeout(Duration::from_millis(200));
        let descriptor = ConnectionDescriptor::new("mysql://root@127.0.0.1:1/", 2, true);

        // Nothing listens on port 1, but the pool is only built here.
        let handle = connector.open(&descriptor).await.unwrap();
        assert!(!handle.is_closed());
        assert!(handle.ping().await.is_err());

        handle.close().await;
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_open_rejects_unparsable_descriptor() {
        let descriptor = ConnectionDescriptor::new("not a url", 2, false);
        let err = MySqlConnector::new().open(&descriptor).await.unwrap_err();
        assert!(matches!(err, sqlx::Error::Configuration(_)));
    }
}
