//! Custom query bridge.
//!
//! User-defined SQL run once per cycle after every scraper finished. The
//! bridge owns its error handling: failures are logged and never reach the
//! cycle's result or meta-metrics.

use serde::{Deserialize, Serialize};
use sqlx::{Column, Row};
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, MySqlHandle, column_f64, column_text};
use crate::sink::{Labels, MetricSink, Sample, fq_name, sanitize_metric_name};

/// A user-defined query turned into samples.
///
/// Each row yields one `<namespace>_<name>_<metric_field>` gauge per metric
/// field, labeled with the row's label fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomQuery {
    /// Metric name prefix, unique among custom queries.
    pub name: String,
    /// Statement to run.
    pub sql: String,
    /// Columns copied into labels.
    #[serde(default)]
    pub label_fields: Vec<String>,
    /// Columns turned into sample values.
    pub metric_fields: Vec<String>,
}

impl CustomQuery {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            label_fields: Vec::new(),
            metric_fields: Vec::new(),
        }
    }

    pub fn with_label_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metric_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metric_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Check the query is runnable.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("custom query name cannot be empty".to_string());
        }
        if self.sql.trim().is_empty() {
            return Err(format!("custom query '{}': sql cannot be empty", self.name));
        }
        if self.metric_fields.is_empty() {
            return Err(format!(
                "custom query '{}': at least one metric field is required",
                self.name
            ));
        }
        Ok(())
    }

    fn metric_name(&self, namespace: &str, field: &str) -> String {
        fq_name(
            namespace,
            &sanitize_metric_name(&self.name),
            &sanitize_metric_name(field),
        )
    }
}

/// Runs custom queries against the cycle's connection.
#[async_trait::async_trait]
pub trait CustomQueryBridge<C: Connection>: Send + Sync + 'static {
    async fn run(
        &self,
        token: &CancellationToken,
        conn: &C,
        sink: &MetricSink,
        queries: &[CustomQuery],
    );
}

/// Bridge that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCustomQueries;

#[async_trait::async_trait]
impl<C: Connection> CustomQueryBridge<C> for NoCustomQueries {
    async fn run(
        &self,
        _token: &CancellationToken,
        _conn: &C,
        _sink: &MetricSink,
        queries: &[CustomQuery],
    ) {
        if !queries.is_empty() {
            tracing::debug!(count = queries.len(), "Custom queries configured but no bridge set");
        }
    }
}

/// Bridge running queries sequentially over a [`MySqlHandle`].
#[derive(Debug, Clone)]
pub struct MySqlCustomQueries {
    namespace: String,
}

impl MySqlCustomQueries {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    async fn run_one(
        &self,
        conn: &MySqlHandle,
        sink: &MetricSink,
        query: &CustomQuery,
    ) -> Result<usize, sqlx::Error> {
        let rows = conn.fetch_all(&query.sql).await?;
        let mut emitted = 0;

        for row in &rows {
            let index_of = |field: &str| {
                row.columns()
                    .iter()
                    .position(|c| c.name().eq_ignore_ascii_case(field))
            };

            let labels: Labels = query
                .label_fields
                .iter()
                .map(|field| {
                    let value = index_of(field)
                        .and_then(|i| column_text(row, i))
                        .unwrap_or_default();
                    (field.clone(), value)
                })
                .collect();

            for field in &query.metric_fields {
                let Some(value) = index_of(field).and_then(|i| column_f64(row, i)) else {
                    tracing::debug!(query = %query.name, field = %field, "Metric field missing or not numeric");
                    continue;
                };
                sink.emit(
                    Sample::gauge(query.metric_name(&self.namespace, field), value)
                        .with_labels(labels.clone()),
                );
                emitted += 1;
            }
        }
        Ok(emitted)
    }
}

#[async_trait::async_trait]
impl CustomQueryBridge<MySqlHandle> for MySqlCustomQueries {
    async fn run(
        &self,
        token: &CancellationToken,
        conn: &MySqlHandle,
        sink: &MetricSink,
        queries: &[CustomQuery],
    ) {
        for query in queries {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!("Custom queries cancelled");
                    return;
                }
                result = self.run_one(conn, sink, query) => result,
            };

            match result {
                Ok(emitted) => {
                    tracing::debug!(query = %query.name, emitted, "Custom query finished");
                }
                Err(e) => {
                    tracing::warn!(query = %query.name, error = %e, "Custom query failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let query = CustomQuery::new("slow_tables", "SELECT 1 AS n").with_metric_fields(["n"]);
        assert!(query.validate().is_ok());

        let err = CustomQuery::new("q", "SELECT 1").validate().unwrap_err();
        assert!(err.contains("metric field"));

        let err = CustomQuery::new(" ", "SELECT 1")
            .with_metric_fields(["n"])
            .validate()
            .unwrap_err();
        assert!(err.contains("name"));

        let err = CustomQuery::new("q", "").with_metric_fields(["n"]).validate().unwrap_err();
        assert!(err.contains("sql"));
    }

    #[test]
    fn test_metric_name() {
        let query = CustomQuery::new("Table-Sizes", "SELECT 1");
        assert_eq!(
            query.metric_name("mysql", "DATA_LENGTH"),
            "mysql_table_sizes_data_length"
        );
    }

    #[test]
    fn test_deserialize_defaults() {
        let query: CustomQuery = serde_yaml::from_str(
            "name: processlist\nsql: SELECT user, COUNT(*) AS n FROM information_schema.processlist GROUP BY user\nmetric_fields: [n]\n",
        )
        .unwrap();
        assert!(query.label_fields.is_empty());
        assert_eq!(query.metric_fields, vec!["n"]);
    }
}
