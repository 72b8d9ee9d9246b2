//! Ordered scraper registry.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ServerVersion;
use crate::connection::{Connection, MySqlHandle};
use crate::scraper::{Scraper, ShowScraper};

/// Names accepted by [`ScraperRegistry::builtin`].
pub const BUILTIN_SCRAPERS: &[&str] = &[ShowScraper::GLOBAL_STATUS, ShowScraper::GLOBAL_VARIABLES];

/// Errors raised while assembling a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two scrapers share a name.
    #[error("duplicate scraper name: '{0}'")]
    DuplicateName(String),

    /// No built-in scraper has this name.
    #[error("unknown scraper: '{0}'")]
    Unknown(String),
}

/// Externally supplied scrapers, kept in registration order.
pub struct ScraperRegistry<C: Connection> {
    scrapers: Vec<Arc<dyn Scraper<C>>>,
}

impl<C: Connection> Default for ScraperRegistry<C> {
    fn default() -> Self {
        Self {
            scrapers: Vec::new(),
        }
    }
}

impl<C: Connection> Clone for ScraperRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            scrapers: self.scrapers.clone(),
        }
    }
}

impl<C: Connection> fmt::Debug for ScraperRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScraperRegistry")
            .field("scrapers", &self.names())
            .finish()
    }
}

impl<C: Connection> ScraperRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scraper; names must be unique.
    pub fn register<S: Scraper<C>>(&mut self, scraper: S) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(scraper))
    }

    /// Append a shared scraper; names must be unique.
    pub fn register_arc(&mut self, scraper: Arc<dyn Scraper<C>>) -> Result<(), RegistryError> {
        if self.scrapers.iter().any(|s| s.name() == scraper.name()) {
            return Err(RegistryError::DuplicateName(scraper.name().to_string()));
        }
        self.scrapers.push(scraper);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<S: Scraper<C>>(mut self, scraper: S) -> Result<Self, RegistryError> {
        self.register(scraper)?;
        Ok(self)
    }

    /// Scrapers allowed to run against `version`, in registration order.
    pub fn eligible(&self, version: ServerVersion) -> Vec<Arc<dyn Scraper<C>>> {
        self.scrapers
            .iter()
            .filter(|s| {
                let ok = version.satisfies(s.min_version());
                if !ok {
                    tracing::debug!(
                        scraper = %s.name(),
                        min_version = s.min_version(),
                        version = %version,
                        "Scraper skipped, target version too old"
                    );
                }
                ok
            })
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.scrapers.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}

impl ScraperRegistry<MySqlHandle> {
    /// Build a registry of built-in scrapers by name.
    pub fn builtin<S: AsRef<str>>(names: &[S], namespace: &str) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        let mut seen = HashSet::new();
        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(RegistryError::DuplicateName(name.to_string()));
            }
            let scraper = match name {
                ShowScraper::GLOBAL_STATUS => ShowScraper::global_status(namespace),
                ShowScraper::GLOBAL_VARIABLES => ShowScraper::global_variables(namespace),
                other => return Err(RegistryError::Unknown(other.to_string())),
            };
            registry.register(scraper)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricSink;
    use crate::error::ScrapeError;
    use tokio_util::sync::CancellationToken;

    struct NoopConn;

    #[async_trait::async_trait]
    impl Connection for NoopConn {
        async fn ping(&self) -> Result<(), sqlx::Error> {
            Ok(())
        }

        async fn query_scalar(&self, _sql: &str) -> Result<String, sqlx::Error> {
            Ok(String::new())
        }

        async fn close(&self) {}
    }

    struct MockScraper {
        name: &'static str,
        min_version: f64,
    }

    #[async_trait::async_trait]
    impl Scraper<NoopConn> for MockScraper {
        fn name(&self) -> &str {
            self.name
        }

        fn help(&self) -> &str {
            "mock"
        }

        fn min_version(&self) -> f64 {
            self.min_version
        }

        async fn scrape(
            &self,
            _token: &CancellationToken,
            _conn: &NoopConn,
            _sink: &MetricSink,
        ) -> Result<(), ScrapeError> {
            Ok(())
        }
    }

    fn registry() -> ScraperRegistry<NoopConn> {
        ScraperRegistry::new()
            .with(MockScraper { name: "a", min_version: 5.1 })
            .unwrap()
            .with(MockScraper { name: "b", min_version: 8.0 })
            .unwrap()
            .with(MockScraper { name: "c", min_version: 5.6 })
            .unwrap()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = registry();
        let err = registry
            .register(MockScraper { name: "b", min_version: 1.0 })
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("b".to_string()));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_eligible_filters_by_version_in_order() {
        let registry = registry();
        let names = |v| {
            registry
                .eligible(ServerVersion::new(v))
                .iter()
                .map(|s| s.name().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(5.7), vec!["a", "c"]);
        assert_eq!(names(8.0), vec!["a", "b", "c"]);
        assert!(names(5.0).is_empty());
    }

    #[test]
    fn test_unknown_version_enables_all() {
        assert_eq!(registry().eligible(ServerVersion::UNKNOWN).len(), 3);
    }

    #[test]
    fn test_builtin_registry() {
        let registry =
            ScraperRegistry::builtin(&["global_status", "global_variables"], "mysql").unwrap();
        assert_eq!(registry.names(), vec!["global_status", "global_variables"]);

        let err = ScraperRegistry::builtin(&["global_status", "global_status"], "mysql").unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("global_status".to_string()));

        let err = ScraperRegistry::builtin(&["innodb_metrics"], "mysql").unwrap_err();
        assert_eq!(err, RegistryError::Unknown("innodb_metrics".to_string()));
    }
}
