//! Scraper Layer
//!
//! Pluggable units that each query one category of target metrics and write
//! the results to the cycle's [`MetricSink`](crate::MetricSink).
//!
//! # Architecture
//!
//! - [`Scraper`]: Core trait implemented by every scraper
//! - [`ScraperRegistry`]: Ordered set of scrapers with unique names
//! - [`ShowScraper`]: Built-in `SHOW GLOBAL STATUS` / `SHOW GLOBAL VARIABLES` scrapers

mod registry;
mod show;
mod traits;

pub use registry::{BUILTIN_SCRAPERS, RegistryError, ScraperRegistry};
pub use show::ShowScraper;
pub use traits::Scraper;
