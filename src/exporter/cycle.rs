//! One scrape cycle.
//!
//! `INIT → CONNECTED → VERSIONED → FANNED_OUT → DRAINED → DONE`. Only the
//! connection phase can fail the cycle; everything after it is contained and
//! reported through samples and logs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::ServerVersion;
use crate::connection::{Connection, ConnectionManager, Connector};
use crate::custom_query::{CustomQuery, CustomQueryBridge};
use crate::error::{ExporterError, ScrapeError};
use crate::exporter::meta::{CONNECTION_LABEL, MetaMetrics, scraper_label};
use crate::scraper::{Scraper, ScraperRegistry};
use crate::sink::MetricSink;

/// Everything a cycle needs, borrowed from the exporter.
pub(super) struct Cycle<'a, K: Connector> {
    pub manager: &'a ConnectionManager<K>,
    pub scrapers: &'a ScraperRegistry<K::Conn>,
    pub bridge: &'a dyn CustomQueryBridge<K::Conn>,
    pub queries: &'a [CustomQuery],
    pub meta: &'a Arc<MetaMetrics>,
}

impl<K: Connector> Cycle<'_, K> {
    /// Run the cycle; `sink` is finalized (dropped) before returning.
    pub async fn run(self, token: &CancellationToken, sink: MetricSink) -> Result<(), ExporterError> {
        let started = Instant::now();

        let lease = match self.manager.acquire(token).await {
            Ok(lease) => lease,
            Err(e) => {
                tracing::error!(addr = %self.manager.target(), error = %e, "Scrape cycle aborted");
                return Err(e);
            }
        };
        sink.duration(&self.meta.duration, started.elapsed(), &[CONNECTION_LABEL]);

        let version = ServerVersion::detect(token, lease.connection().as_ref()).await;
        let eligible = self.scrapers.eligible(version);
        tracing::debug!(
            addr = %self.manager.target(),
            version = %version,
            eligible = eligible.len(),
            registered = self.scrapers.len(),
            "Fanning out scrapers"
        );

        let target: Arc<str> = Arc::from(self.manager.target());
        let mut tasks = JoinSet::new();
        for scraper in eligible {
            tasks.spawn(scrape_one(
                scraper,
                Arc::clone(lease.connection()),
                sink.clone(),
                token.clone(),
                Arc::clone(self.meta),
                Arc::clone(&target),
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Scraper task did not complete");
            }
        }

        self.bridge
            .run(token, lease.connection().as_ref(), &sink, self.queries)
            .await;

        lease.release().await;
        drop(sink);

        tracing::debug!(
            addr = %target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scrape cycle finished"
        );
        Ok(())
    }
}

/// Run one scraper and emit its success and duration samples.
async fn scrape_one<C: Connection>(
    scraper: Arc<dyn Scraper<C>>,
    conn: Arc<C>,
    sink: MetricSink,
    token: CancellationToken,
    meta: Arc<MetaMetrics>,
    target: Arc<str>,
) {
    let label = scraper_label(scraper.name());
    let started = Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => Err(ScrapeError::Cancelled),
        outcome = AssertUnwindSafe(scraper.scrape(&token, &conn, &sink)).catch_unwind() => {
            outcome.unwrap_or_else(|panic| Err(ScrapeError::Panicked(panic_message(&*panic))))
        }
    };

    let success = match &outcome {
        Ok(()) => 1.0,
        Err(e @ ScrapeError::Cancelled) => {
            tracing::warn!(scraper = %scraper.name(), addr = %target, error = %e, "Scraper cancelled");
            0.0
        }
        Err(e) => {
            tracing::error!(scraper = %scraper.name(), addr = %target, error = %e, "Error from scraper");
            0.0
        }
    };

    sink.gauge(&meta.success, success, &[&label]);
    sink.duration(&meta.duration, started.elapsed(), &[&label]);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
