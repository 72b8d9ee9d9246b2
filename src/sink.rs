//! Metric sink.
//!
//! Scrapers and the orchestrator push [`Sample`]s into a [`MetricSink`]; the
//! host drains them from the paired [`SampleReceiver`].
//!
//! - **Producers**: cheap clones of the sink, one per concurrent task
//! - **Consumer**: a single receiver, which observes end of stream once every
//!   sink handle has been dropped

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Label set attached to a sample.
pub type Labels = BTreeMap<String, String>;

/// How a sample value should be interpreted by the host metrics system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ValueType {
    Gauge,
    Counter,
    Untyped,
}

/// Identity of a metric family: fully-qualified name, help text and label names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDesc {
    pub fq_name: String,
    pub help: String,
    pub label_names: Vec<String>,
}

impl MetricDesc {
    pub fn new(fq_name: impl Into<String>, help: impl Into<String>, label_names: &[&str]) -> Self {
        Self {
            fq_name: fq_name.into(),
            help: help.into(),
            label_names: label_names.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    /// Build a gauge sample for this family.
    ///
    /// `label_values` are zipped with the declared label names in order.
    pub fn gauge(&self, value: f64, label_values: &[&str]) -> Sample {
        let labels = self
            .label_names
            .iter()
            .zip(label_values)
            .map(|(name, value)| (name.clone(), (*value).to_string()))
            .collect();
        Sample::new(self.fq_name.clone(), ValueType::Gauge, value).with_labels(labels)
    }
}

/// Join non-empty name parts with `_`, the way metric families are named.
///
/// ```
/// use mysqlscrape::sink::fq_name;
///
/// assert_eq!(fq_name("mysql", "exporter", "collector_success"), "mysql_exporter_collector_success");
/// assert_eq!(fq_name("mysql", "", "up"), "mysql_up");
/// ```
pub fn fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Lowercase `name` and replace anything outside `[a-z0-9_]` with `_`.
pub fn sanitize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }
        })
        .collect()
}

/// A single timestamped observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Fully-qualified metric name.
    pub name: String,
    pub kind: ValueType,
    pub value: f64,
    pub labels: Labels,
    /// Observation time (UTC).
    pub ts: DateTime<Utc>,
}

impl Sample {
    pub fn new(name: impl Into<String>, kind: ValueType, value: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            labels: Labels::new(),
            ts: Utc::now(),
        }
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, ValueType::Gauge, value)
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Look up a label value.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.labels.is_empty() {
            f.write_str("{")?;
            for (i, (name, value)) in self.labels.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}=\"{}\"", name, value.replace('\\', "\\\\").replace('"', "\\\""))?;
            }
            f.write_str("}")?;
        }
        write!(f, " {}", self.value)
    }
}

/// Multi-producer, append-only sample destination.
///
/// Sends never block. Samples pushed after the receiver is gone are counted
/// and discarded.
#[derive(Clone)]
pub struct MetricSink {
    tx: UnboundedSender<Sample>,
    dropped: Arc<AtomicU64>,
}

impl fmt::Debug for MetricSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricSink")
            .field("dropped", &self.dropped_count())
            .finish_non_exhaustive()
    }
}

impl MetricSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel() -> (MetricSink, SampleReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MetricSink {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            SampleReceiver { rx },
        )
    }

    /// Push a sample.
    pub fn emit(&self, sample: Sample) {
        if self.tx.send(sample).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if total == 1 || total % 1000 == 0 {
                tracing::warn!(dropped_total = total, "Sample receiver gone, dropping samples");
            }
        }
    }

    /// Push a gauge sample built from a descriptor.
    pub fn gauge(&self, desc: &MetricDesc, value: f64, label_values: &[&str]) {
        self.emit(desc.gauge(value, label_values));
    }

    /// Push a duration in seconds.
    pub fn duration(&self, desc: &MetricDesc, elapsed: Duration, label_values: &[&str]) {
        self.gauge(desc, elapsed.as_secs_f64(), label_values);
    }

    /// Number of samples discarded because the receiver was dropped.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side of a [`MetricSink`].
#[derive(Debug)]
pub struct SampleReceiver {
    rx: UnboundedReceiver<Sample>,
}

impl SampleReceiver {
    /// Wait for the next sample; `None` once every sink handle is dropped.
    pub async fn recv(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }

    /// Take every sample currently buffered without waiting.
    pub fn drain(&mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            samples.push(sample);
        }
        samples
    }

    /// Collect samples until the stream ends.
    pub async fn collect_all(mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Some(sample) = self.rx.recv().await {
            samples.push(sample);
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_fq_name_skips_empty_parts() {
        assert_eq!(fq_name("", "", "up"), "up");
        assert_eq!(fq_name("mysql", "global_status", "threads"), "mysql_global_status_threads");
    }

    #[test]
    fn test_sanitize_metric_name() {
        assert_eq!(sanitize_metric_name("Com_alter_db"), "com_alter_db");
        assert_eq!(sanitize_metric_name("wsrep.local-state"), "wsrep_local_state");
    }

    #[test]
    fn test_value_type_from_str() {
        assert_eq!(ValueType::from_str("GAUGE").unwrap(), ValueType::Gauge);
        assert_eq!(ValueType::Counter.as_ref(), "counter");
        assert!(ValueType::from_str("histogram").is_err());
    }

    #[test]
    fn test_desc_gauge_zips_labels() {
        let desc = MetricDesc::new("mysql_exporter_collector_success", "help", &["collector"]);
        let sample = desc.gauge(1.0, &["collect.global_status"]);
        assert_eq!(sample.name, "mysql_exporter_collector_success");
        assert_eq!(sample.kind, ValueType::Gauge);
        assert_eq!(sample.label("collector"), Some("collect.global_status"));
    }

    #[test]
    fn test_sample_display() {
        let sample = Sample::gauge("mysql_up", 1.0);
        assert_eq!(sample.to_string(), "mysql_up 1");

        let sample = Sample::gauge("m", 0.5)
            .with_label("b", "x\"y")
            .with_label("a", "1");
        assert_eq!(sample.to_string(), "m{a=\"1\",b=\"x\\\"y\"} 0.5");
    }

    #[tokio::test]
    async fn test_sink_stream_ends_when_all_handles_dropped() {
        let (sink, rx) = MetricSink::channel();
        let clone = sink.clone();
        clone.emit(Sample::gauge("a", 1.0));
        sink.emit(Sample::gauge("b", 2.0));
        drop(clone);
        drop(sink);

        let samples = rx.collect_all().await;
        let names: Vec<_> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_sink_counts_dropped_samples() {
        let (sink, rx) = MetricSink::channel();
        drop(rx);
        sink.emit(Sample::gauge("a", 1.0));
        sink.emit(Sample::gauge("b", 1.0));
        assert_eq!(sink.dropped_count(), 2);
    }

    #[test]
    fn test_receiver_drain() {
        let (sink, mut rx) = MetricSink::channel();
        assert!(rx.drain().is_empty());
        sink.emit(Sample::gauge("a", 1.0));
        assert_eq!(rx.drain().len(), 1);
    }
}
