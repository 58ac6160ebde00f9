//! Metrics infrastructure for geotile.
//!
//! This crate describes every metric recorded while tiling rasters and
//! sampling datasets. It re-exports the `metrics` crate for convenience and
//! declares each metric as a structured [`Metric`] constant to avoid typos
//! and carry rich metadata.
//!
//! With no recorder installed the `metrics` macros are no-ops. The
//! [`SummaryRecorder`] collects totals in memory so a run can export them.
//!
//! # Example
//!
//! ```rust,ignore
//! use geotile_metrics::{MetricLabels, metric_defs, describe_metrics};
//!
//! // Initialize metrics descriptions at startup
//! describe_metrics();
//!
//! let labels = MetricLabels::new("positive");
//! metrics::counter!(metric_defs::EXAMPLES_SELECTED.name, &labels.to_labels()).increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use geotile_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["pool"]);
//!
//! MY_COUNTER.describe();
//! metrics::counter!(MY_COUNTER.name).increment(1);
//! ```

pub use metrics;

mod recorder;

pub use recorder::{HistogramSummary, MetricValue, MetricsSnapshot, SummaryRecorder};

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// Use the const constructors to declare metrics at compile time.
///
/// ```rust
/// use geotile_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const TILES: Metric = Metric::counter("geotile.extract.tiles")
///     .with_description("Tiles extracted")
///     .with_unit(Unit::Count);
///
/// assert_eq!(TILES.name, "geotile.extract.tiles");
/// assert_eq!(TILES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "geotile.raster.reads").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    ///
    /// This should be called once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Standard Label Keys
    // ========================================================================

    /// Labels on metrics broken down by example pool.
    pub const POOL_LABELS: &[&str] = &["pool"];

    // ========================================================================
    // Raster Access
    // ========================================================================

    /// Pixel frames read from a raster source.
    pub const RASTER_READS: Metric = Metric::counter("geotile.raster.reads")
        .with_description("Pixel frames read from a raster source")
        .with_unit(Unit::Count);

    /// Frames that fell entirely outside the raster and were filled instead.
    pub const FRAMES_OUT_OF_BOUNDS: Metric =
        Metric::counter("geotile.raster.frames_out_of_bounds")
            .with_description("Frames outside the raster replaced by fill arrays")
            .with_unit(Unit::Count);

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Tiles in the grid of the raster being extracted.
    pub const GRID_TILES: Metric = Metric::gauge("geotile.extract.grid_tiles")
        .with_description("Tile count of the current extraction grid")
        .with_unit(Unit::Count);

    /// Tiles written to an extracted pool.
    pub const TILES_EXTRACTED: Metric = Metric::counter("geotile.extract.tiles")
        .with_description("Tiles extracted into example pools")
        .with_unit(Unit::Count);

    // ========================================================================
    // Dataset Sampling
    // ========================================================================

    /// Examples accepted by index selection.
    ///
    /// Labels: pool
    pub const EXAMPLES_SELECTED: Metric = Metric::counter("geotile.dataset.examples_selected")
        .with_description("Examples eligible after selection")
        .with_unit(Unit::Count)
        .with_labels(POOL_LABELS);

    /// Examples dropped because every sample was zero.
    ///
    /// Labels: pool
    pub const EXAMPLES_SKIPPED_EMPTY: Metric =
        Metric::counter("geotile.dataset.examples_skipped_empty")
            .with_description("Examples skipped because their arrays are empty")
            .with_unit(Unit::Count)
            .with_labels(POOL_LABELS);

    /// Examples dropped because their tile touches the excluded bounds.
    ///
    /// Labels: pool
    pub const EXAMPLES_EXCLUDED: Metric = Metric::counter("geotile.dataset.examples_excluded")
        .with_description("Examples excluded by pixel bounds")
        .with_unit(Unit::Count)
        .with_labels(POOL_LABELS);

    /// Examples written to assembled datasets.
    pub const EXAMPLES_WRITTEN: Metric = Metric::counter("geotile.dataset.examples_written")
        .with_description("Examples written to assembled datasets")
        .with_unit(Unit::Count);

    /// Positive fraction of each assembled dataset.
    pub const DATASET_POSITIVE_FRACTION: Metric =
        Metric::histogram("geotile.dataset.positive_fraction")
            .with_description("Fraction of positive examples in assembled datasets");

    // ========================================================================
    // Batching
    // ========================================================================

    /// Keys repeated to fill the last batch.
    pub const BATCH_PADDING_KEYS: Metric = Metric::counter("geotile.batch.padding_keys")
        .with_description("Keys repeated to complete the final batch")
        .with_unit(Unit::Count);

    /// Arrays skipped while collecting batch keys because they are empty.
    pub const BATCH_EMPTY_ARRAYS: Metric = Metric::counter("geotile.batch.empty_arrays")
        .with_description("Empty arrays skipped while collecting batch keys")
        .with_unit(Unit::Count);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        // Raster Access
        &RASTER_READS,
        &FRAMES_OUT_OF_BOUNDS,
        // Extraction
        &GRID_TILES,
        &TILES_EXTRACTED,
        // Dataset Sampling
        &EXAMPLES_SELECTED,
        &EXAMPLES_SKIPPED_EMPTY,
        &EXAMPLES_EXCLUDED,
        &EXAMPLES_WRITTEN,
        &DATASET_POSITIVE_FRACTION,
        // Batching
        &BATCH_PADDING_KEYS,
        &BATCH_EMPTY_ARRAYS,
    ];
}

/// Labels identifying the example pool a metric refers to.
///
/// ```rust
/// use geotile_metrics::MetricLabels;
///
/// let labels = MetricLabels::new("negative");
/// assert_eq!(labels.to_labels(), vec![("pool", "negative".to_string())]);
/// ```
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// Pool name ("positive", "negative" or a dataset name).
    pub pool: String,
}

impl MetricLabels {
    pub fn new(pool: impl Into<String>) -> Self {
        Self { pool: pool.into() }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("pool", self.pool.clone())]
    }
}

/// Describes all metrics.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
