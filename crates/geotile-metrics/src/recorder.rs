//! In-memory recorder that keeps running totals for export at the end of a run.

use metrics::{
    Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Samples(Mutex<Vec<f64>>);

impl HistogramFn for Samples {
    fn record(&self, value: f64) {
        self.0.lock().push(value);
    }
}

#[derive(Debug, Default)]
struct Registry {
    counters: HashMap<Key, Arc<AtomicU64>>,
    gauges: HashMap<Key, Arc<AtomicU64>>,
    histograms: HashMap<Key, Arc<Samples>>,
}

/// A [`Recorder`] that accumulates every metric in memory.
///
/// Clones share the same storage, so one clone can be installed globally
/// while another takes the [`snapshot`](SummaryRecorder::snapshot).
#[derive(Debug, Clone, Default)]
pub struct SummaryRecorder {
    registry: Arc<Mutex<Registry>>,
}

/// Summary statistics of a histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Exported value of one metric name, summed over its label sets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Counter {
        total: u64,
        /// Totals broken down by label key, then label value.
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        labels: BTreeMap<String, BTreeMap<String, u64>>,
    },
    Gauge {
        total: f64,
    },
    Histogram(HistogramSummary),
}

/// Every metric recorded so far.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// RFC 3339 time the snapshot was taken.
    pub timestamp: String,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl MetricsSnapshot {
    /// Total of a counter, or zero if it was never incremented.
    pub fn counter_total(&self, name: &str) -> u64 {
        match self.metrics.get(name) {
            Some(MetricValue::Counter { total, .. }) => *total,
            _ => 0,
        }
    }

    /// Counter total for one label value.
    pub fn counter_for_label(&self, name: &str, label: &str, value: &str) -> u64 {
        match self.metrics.get(name) {
            Some(MetricValue::Counter { labels, .. }) => labels
                .get(label)
                .and_then(|values| values.get(value))
                .copied()
                .unwrap_or(0),
            _ => 0,
        }
    }
}

impl SummaryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summarize everything recorded so far.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let registry = self.registry.lock();
        let mut metrics = BTreeMap::new();

        for (key, counter) in &registry.counters {
            let value = counter.load(Ordering::Relaxed);
            let entry = metrics
                .entry(key.name().to_string())
                .or_insert_with(|| MetricValue::Counter {
                    total: 0,
                    labels: BTreeMap::new(),
                });
            if let MetricValue::Counter { total, labels } = entry {
                *total += value;
                for label in key.labels() {
                    *labels
                        .entry(label.key().to_string())
                        .or_default()
                        .entry(label.value().to_string())
                        .or_default() += value;
                }
            }
        }

        for (key, gauge) in &registry.gauges {
            let value = f64::from_bits(gauge.load(Ordering::Relaxed));
            let entry = metrics
                .entry(key.name().to_string())
                .or_insert(MetricValue::Gauge { total: 0.0 });
            if let MetricValue::Gauge { total } = entry {
                *total += value;
            }
        }

        let mut samples_by_name: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (key, samples) in &registry.histograms {
            samples_by_name
                .entry(key.name().to_string())
                .or_default()
                .extend(samples.0.lock().iter().copied());
        }
        for (name, samples) in samples_by_name {
            if let Some(summary) = summarize(&samples) {
                metrics.insert(name, MetricValue::Histogram(summary));
            }
        }

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            metrics,
        }
    }
}

fn summarize(samples: &[f64]) -> Option<HistogramSummary> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().sum();
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(HistogramSummary {
        count: samples.len() as u64,
        sum,
        min,
        max,
        mean: sum / samples.len() as f64,
    })
}

impl Recorder for SummaryRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let mut registry = self.registry.lock();
        let counter = registry.counters.entry(key.clone()).or_default().clone();
        Counter::from_arc(counter)
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        let mut registry = self.registry.lock();
        let gauge = registry.gauges.entry(key.clone()).or_default().clone();
        Gauge::from_arc(gauge)
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        let mut registry = self.registry.lock();
        let samples = registry.histograms.entry(key.clone()).or_default().clone();
        Histogram::from_arc(samples)
    }
}
