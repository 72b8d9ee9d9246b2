//! Exporter facade: host collector contract.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ConnectionDescriptor;
use crate::connection::{ConnectionManager, Connector};
use crate::custom_query::{CustomQuery, CustomQueryBridge, NoCustomQueries};
use crate::error::ExporterError;
use crate::exporter::cycle::Cycle;
use crate::exporter::meta::MetaMetrics;
use crate::scraper::ScraperRegistry;
use crate::sink::{MetricDesc, MetricSink};

/// Default `lock_wait_timeout` in seconds.
pub const DEFAULT_LOCK_WAIT_TIMEOUT: u32 = 2;

/// Default metric namespace.
pub const DEFAULT_NAMESPACE: &str = "mysql";

/// Collects metrics from one target, one cycle per [`collect`](Self::collect).
///
/// # Example
///
/// ```rust,no_run
/// use mysqlscrape::{Exporter, MetricSink, MySqlConnector, ScraperRegistry};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let scrapers = ScraperRegistry::builtin(&["global_status"], "mysql")?;
/// let exporter = Exporter::builder(MySqlConnector::new(), "mysql://exporter@127.0.0.1:3306/")
///     .lock_wait_timeout(2)
///     .scrapers(scrapers)
///     .build();
///
/// let (sink, samples) = MetricSink::channel();
/// exporter.collect(sink).await?;
/// for sample in samples.collect_all().await {
///     println!("{sample}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Exporter<K: Connector> {
    manager: ConnectionManager<K>,
    scrapers: ScraperRegistry<K::Conn>,
    bridge: Arc<dyn CustomQueryBridge<K::Conn>>,
    queries: Vec<CustomQuery>,
    meta: Arc<MetaMetrics>,
    token: CancellationToken,
}

impl<K: Connector> fmt::Debug for Exporter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("target", &self.manager.target())
            .field("scrapers", &self.scrapers)
            .field("custom_queries", &self.queries.len())
            .finish_non_exhaustive()
    }
}

impl<K: Connector> Exporter<K> {
    /// Start building an exporter for `dsn`.
    pub fn builder(connector: K, dsn: impl Into<String>) -> ExporterBuilder<K> {
        ExporterBuilder::new(connector, dsn)
    }

    /// Metric families this exporter emits itself: duration, then success.
    pub fn describe(&self) -> Vec<MetricDesc> {
        vec![self.meta.duration.clone(), self.meta.success.clone()]
    }

    /// Run one cycle with the exporter's cancellation token.
    ///
    /// Returns an error only when the target cannot be connected to.
    pub async fn collect(&self, sink: MetricSink) -> Result<(), ExporterError> {
        self.collect_with(&self.token, sink).await
    }

    /// Run one cycle with a caller-supplied cancellation token.
    pub async fn collect_with(
        &self,
        token: &CancellationToken,
        sink: MetricSink,
    ) -> Result<(), ExporterError> {
        Cycle {
            manager: &self.manager,
            scrapers: &self.scrapers,
            bridge: self.bridge.as_ref(),
            queries: &self.queries,
            meta: &self.meta,
        }
        .run(token, sink)
        .await
    }

    /// Augmented connection descriptor.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        self.manager.descriptor()
    }

    /// Target address, safe to log.
    pub fn target(&self) -> &str {
        self.manager.target()
    }

    pub fn scrapers(&self) -> &ScraperRegistry<K::Conn> {
        &self.scrapers
    }

    pub fn meta_metrics(&self) -> &MetaMetrics {
        &self.meta
    }
}

/// Builder for [`Exporter`].
pub struct ExporterBuilder<K: Connector> {
    connector: K,
    dsn: String,
    lock_wait_timeout: u32,
    log_slow_filter: bool,
    namespace: String,
    scrapers: ScraperRegistry<K::Conn>,
    bridge: Arc<dyn CustomQueryBridge<K::Conn>>,
    queries: Vec<CustomQuery>,
    token: CancellationToken,
}

impl<K: Connector> ExporterBuilder<K> {
    fn new(connector: K, dsn: impl Into<String>) -> Self {
        Self {
            connector,
            dsn: dsn.into(),
            lock_wait_timeout: DEFAULT_LOCK_WAIT_TIMEOUT,
            log_slow_filter: false,
            namespace: DEFAULT_NAMESPACE.to_string(),
            scrapers: ScraperRegistry::new(),
            bridge: Arc::new(NoCustomQueries),
            queries: Vec::new(),
            token: CancellationToken::new(),
        }
    }

    /// `lock_wait_timeout` session value, in seconds.
    pub fn lock_wait_timeout(mut self, seconds: u32) -> Self {
        self.lock_wait_timeout = seconds;
        self
    }

    /// Keep scrape queries out of the slow query log (not supported by Oracle MySQL).
    pub fn log_slow_filter(mut self, enabled: bool) -> Self {
        self.log_slow_filter = enabled;
        self
    }

    /// Prefix of the meta-metric names.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn scrapers(mut self, scrapers: ScraperRegistry<K::Conn>) -> Self {
        self.scrapers = scrapers;
        self
    }

    /// Bridge and queries run once per cycle after the scrapers.
    pub fn custom_queries<B>(mut self, bridge: B, queries: Vec<CustomQuery>) -> Self
    where
        B: CustomQueryBridge<K::Conn>,
    {
        self.bridge = Arc::new(bridge);
        self.queries = queries;
        self
    }

    /// Token used by [`Exporter::collect`].
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn build(self) -> Exporter<K> {
        let descriptor =
            ConnectionDescriptor::new(&self.dsn, self.lock_wait_timeout, self.log_slow_filter);
        let manager = ConnectionManager::new(self.connector, descriptor);
        tracing::info!(
            addr = %manager.target(),
            scrapers = ?self.scrapers.names(),
            custom_queries = self.queries.len(),
            "Exporter created"
        );

        Exporter {
            manager,
            scrapers: self.scrapers,
            bridge: self.bridge,
            queries: self.queries,
            meta: Arc::new(MetaMetrics::new(&self.namespace)),
            token: self.token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MySqlConnector;

    #[test]
    fn test_builder_augments_descriptor_once() {
        let exporter = Exporter::builder(MySqlConnector::new(), "mysql://u:p@db:3306/?a=b")
            .lock_wait_timeout(5)
            .log_slow_filter(true)
            .build();
        assert_eq!(
            exporter.descriptor().as_str(),
            "mysql://u:p@db:3306/?a=b&lock_wait_timeout=5&log_slow_filter=%27tmp_table_on_disk,filesort_on_disk%27"
        );
        assert_eq!(exporter.target(), "db:3306");
    }

    #[test]
    fn test_describe_declares_both_families() {
        let exporter = Exporter::builder(MySqlConnector::new(), "mysql://db/")
            .namespace("maria")
            .build();
        let names: Vec<_> = exporter.describe().into_iter().map(|d| d.fq_name).collect();
        assert_eq!(
            names,
            vec!["maria_exporter_collector_duration_seconds", "maria_exporter_collector_success"]
        );
        assert!(exporter.describe().iter().all(|d| d.label_names == vec!["collector"]));
    }

    #[test]
    fn test_builder_defaults() {
        let exporter = Exporter::builder(MySqlConnector::new(), "mysql://db/").build();
        assert_eq!(exporter.descriptor().as_str(), "mysql://db/?lock_wait_timeout=2");
        assert!(exporter.scrapers().is_empty());
        assert_eq!(
            exporter.meta_metrics().success.fq_name,
            "mysql_exporter_collector_success"
        );
    }
}
