//! `SHOW GLOBAL ...` scrapers.
//!
//! Both statements return `(Variable_name, Value)` rows. Numeric values (and
//! `ON`/`OFF` style booleans) become one sample each; everything else is
//! skipped.

use tokio_util::sync::CancellationToken;

use crate::connection::{MySqlHandle, column_f64, column_text};
use crate::error::ScrapeError;
use crate::scraper::Scraper;
use crate::sink::{MetricSink, Sample, ValueType, fq_name, sanitize_metric_name};

/// Scraper backed by a single two-column `SHOW` statement.
#[derive(Debug, Clone)]
pub struct ShowScraper {
    name: &'static str,
    help: &'static str,
    sql: &'static str,
    namespace: String,
    kind: ValueType,
    min_version: f64,
}

impl ShowScraper {
    pub const GLOBAL_STATUS: &'static str = "global_status";
    pub const GLOBAL_VARIABLES: &'static str = "global_variables";

    /// `SHOW GLOBAL STATUS` as `<namespace>_global_status_<name>`.
    pub fn global_status(namespace: impl Into<String>) -> Self {
        Self {
            name: Self::GLOBAL_STATUS,
            help: "Collect from SHOW GLOBAL STATUS",
            sql: "SHOW GLOBAL STATUS",
            namespace: namespace.into(),
            kind: ValueType::Untyped,
            min_version: 5.1,
        }
    }

    /// `SHOW GLOBAL VARIABLES` as `<namespace>_global_variables_<name>`.
    pub fn global_variables(namespace: impl Into<String>) -> Self {
        Self {
            name: Self::GLOBAL_VARIABLES,
            help: "Collect from SHOW GLOBAL VARIABLES",
            sql: "SHOW GLOBAL VARIABLES",
            namespace: namespace.into(),
            kind: ValueType::Gauge,
            min_version: 5.1,
        }
    }

    fn sample(&self, variable: &str, value: f64) -> Sample {
        let name = fq_name(&self.namespace, self.name, &sanitize_metric_name(variable));
        Sample::new(name, self.kind, value)
    }
}

#[async_trait::async_trait]
impl Scraper<MySqlHandle> for ShowScraper {
    fn name(&self) -> &str {
        self.name
    }

    fn help(&self) -> &str {
        self.help
    }

    fn min_version(&self) -> f64 {
        self.min_version
    }

    async fn scrape(
        &self,
        token: &CancellationToken,
        conn: &MySqlHandle,
        sink: &MetricSink,
    ) -> Result<(), ScrapeError> {
        let rows = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ScrapeError::Cancelled),
            rows = conn.fetch_all(self.sql) => rows?,
        };

        let mut emitted = 0usize;
        for row in &rows {
            let (Some(variable), Some(value)) = (column_text(row, 0), column_f64(row, 1)) else {
                continue;
            };
            sink.emit(self.sample(&variable, value));
            emitted += 1;
        }

        tracing::debug!(scraper = %self.name, rows = rows.len(), emitted, "Scrape finished");
        Ok(())
    }
}
