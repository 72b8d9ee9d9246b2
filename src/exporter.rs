//! Exporter facade and scrape cycle.
//!
//! - [`Exporter`]: `describe()` / `collect()` entry point
//! - [`ExporterBuilder`]: construction-time configuration
//! - [`MetaMetrics`]: the duration and success families emitted per cycle

mod cycle;
mod facade;
mod meta;

pub use facade::{DEFAULT_LOCK_WAIT_TIMEOUT, DEFAULT_NAMESPACE, Exporter, ExporterBuilder};
pub use meta::{CONNECTION_LABEL, MetaMetrics, scraper_label};
