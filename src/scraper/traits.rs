//! Core scraper trait.

use tokio_util::sync::CancellationToken;

use crate::MetricSink;
use crate::connection::Connection;
use crate::error::ScrapeError;

/// A pluggable metric collector run once per cycle.
///
/// # Error Handling
///
/// An `Err` marks this scraper as failed for the cycle (`success = 0`) and is
/// logged; it never affects sibling scrapers or the cycle itself. Samples
/// already written before the error are kept.
///
/// # Cancellation
///
/// `token` fires when the cycle is cancelled. Scrapers should stop promptly;
/// the orchestrator drops a scrape that keeps running after cancellation and
/// records it as [`ScrapeError::Cancelled`].
#[async_trait::async_trait]
pub trait Scraper<C: Connection>: Send + Sync + 'static {
    /// Unique name; the meta-metric label is `collect.<name>`.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn help(&self) -> &str;

    /// Minimum target version this scraper supports.
    fn min_version(&self) -> f64;

    /// Query the target and write samples to `sink`.
    async fn scrape(
        &self,
        token: &CancellationToken,
        conn: &C,
        sink: &MetricSink,
    ) -> Result<(), ScrapeError>;
}
