//! Meta-metric families describing the scrape itself.

use crate::sink::{MetricDesc, fq_name};

/// Label value for the connection phase.
pub const CONNECTION_LABEL: &str = "connection";

/// Label dimension shared by both families.
const COLLECTOR_LABEL_NAME: &str = "collector";

const EXPORTER_SUBSYSTEM: &str = "exporter";

/// Label value for a scraper: `collect.<name>`.
pub fn scraper_label(name: &str) -> String {
    format!("collect.{name}")
}

/// Duration and success families, built once per exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaMetrics {
    pub duration: MetricDesc,
    pub success: MetricDesc,
}

impl MetaMetrics {
    pub fn new(namespace: &str) -> Self {
        Self {
            duration: MetricDesc::new(
                fq_name(namespace, EXPORTER_SUBSYSTEM, "collector_duration_seconds"),
                "Collector time duration.",
                &[COLLECTOR_LABEL_NAME],
            ),
            success: MetricDesc::new(
                fq_name(namespace, EXPORTER_SUBSYSTEM, "collector_success"),
                "mysqld_exporter: Whether a collector succeeded.",
                &[COLLECTOR_LABEL_NAME],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_metric_names() {
        let meta = MetaMetrics::new("mysql");
        assert_eq!(meta.duration.fq_name, "mysql_exporter_collector_duration_seconds");
        assert_eq!(meta.success.fq_name, "mysql_exporter_collector_success");
        assert_eq!(meta.success.label_names, vec!["collector"]);
    }

    #[test]
    fn test_scraper_label() {
        assert_eq!(scraper_label("global_status"), "collect.global_status");
    }
}
