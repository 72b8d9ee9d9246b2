//! mysqlscrape - MySQL metrics scrape engine
//!
//! This crate collects metrics from a single MySQL-compatible server. It can
//! be embedded by a host collector framework, or run as a standalone binary
//! with the `mysqlscrape` executable.
//!
//! # Architecture
//!
//! - **Exporter**: `describe()` / `collect()` facade driving one scrape cycle
//! - **Connection**: one bounded, pinged connection per cycle with session settings
//! - **Scrapers**: version-gated units fanned out concurrently over that connection
//! - **Sink**: channel of samples consumed by the host
//! - **Config**: YAML configuration for the standalone binary
//!
//! # Example
//!
//! ```rust,no_run
//! use mysqlscrape::{Exporter, MetricSink, MySqlConnector, ScraperRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exporter = Exporter::builder(MySqlConnector::new(), "mysql://exporter@127.0.0.1:3306/")
//!         .scrapers(ScraperRegistry::builtin(&["global_status", "global_variables"], "mysql")?)
//!         .build();
//!
//!     let (sink, samples) = MetricSink::channel();
//!     exporter.collect(sink).await?;
//!     println!("{} samples", samples.collect_all().await.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod custom_query;
pub mod dsn;
pub mod error;
pub mod exporter;
pub mod scraper;
pub mod sink;
pub mod version;

pub use connection::{Connection, Connector, MySqlConnector, MySqlHandle};
pub use custom_query::{CustomQuery, CustomQueryBridge, MySqlCustomQueries, NoCustomQueries};
pub use dsn::ConnectionDescriptor;
pub use error::{ExporterError, ScrapeError};
pub use exporter::{Exporter, ExporterBuilder, MetaMetrics};
pub use scraper::{Scraper, ScraperRegistry};
pub use sink::{MetricDesc, MetricSink, Sample, SampleReceiver, ValueType};
pub use version::ServerVersion;

pub use tokio_util::sync::CancellationToken;
