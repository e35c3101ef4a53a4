//! Prometheus self-metrics for the metric sink.
//!
//! This module exposes how much the sink is ingesting, pruning, and holding:
//! - Batches ingested and points recorded
//! - Points pruned and series reclaimed
//! - Series and points currently retained
//!
//! # Example
//!
//! ```rust
//! use metric_sink::prometheus::PrometheusRegistry;
//! use metric_sink::MetricSink;
//! use std::time::Duration;
//!
//! let registry = PrometheusRegistry::new();
//! let sink = MetricSink::new(Duration::from_secs(140), Duration::from_secs(900), ["memory/usage"])
//!     .unwrap()
//!     .with_metrics(registry.sink_metrics().clone());
//!
//! sink.ingest(&metric_sink::Batch::now());
//!
//! let output = registry.encode();
//! assert!(output.contains("metric_sink_batches_total"));
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::sink::IngestSummary;

/// Counters and gauges describing the sink's activity.
///
/// Cloning yields a handle to the same underlying metrics.
#[derive(Clone)]
pub struct SinkMetrics {
    batches: Counter,
    points_recorded: Counter,
    points_pruned: Counter,
    series_reclaimed: Counter,
    series: Gauge,
    points: Gauge,
}

impl std::fmt::Debug for SinkMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkMetrics")
            .field("batches", &self.batches.get())
            .field("series", &self.series.get())
            .finish_non_exhaustive()
    }
}

impl SinkMetrics {
    /// Creates the sink metrics and registers them with the given registry.
    pub fn register(registry: &mut Registry) -> Self {
        // Counters get their `_total` suffix from the encoder.
        let batches = Counter::default();
        registry.register(
            "metric_sink_batches",
            "Number of batches ingested by the metric sink",
            batches.clone(),
        );

        let points_recorded = Counter::default();
        registry.register(
            "metric_sink_points_recorded",
            "Number of points recorded by the metric sink",
            points_recorded.clone(),
        );

        let points_pruned = Counter::default();
        registry.register(
            "metric_sink_points_pruned",
            "Number of points evicted after exceeding their retention",
            points_pruned.clone(),
        );

        let series_reclaimed = Counter::default();
        registry.register(
            "metric_sink_series_reclaimed",
            "Number of series dropped after all their points expired",
            series_reclaimed.clone(),
        );

        let series = Gauge::default();
        registry.register(
            "metric_sink_series",
            "Number of series currently retained",
            series.clone(),
        );

        let points = Gauge::default();
        registry.register(
            "metric_sink_points",
            "Number of points currently retained",
            points.clone(),
        );

        Self {
            batches,
            points_recorded,
            points_pruned,
            series_reclaimed,
            series,
            points,
        }
    }

    /// Applies the outcome of one ingestion pass.
    #[allow(clippy::cast_possible_wrap)] // Retained counts won't exceed i64::MAX
    pub(crate) fn observe(&self, summary: &IngestSummary) {
        self.batches.inc();
        self.points_recorded.inc_by(summary.points_recorded as u64);
        self.observe_sweep(
            summary.points_pruned,
            summary.series_reclaimed,
            summary.series,
            summary.points,
        );
    }

    /// Applies the outcome of a sweep, which retains no new points.
    #[allow(clippy::cast_possible_wrap)] // Retained counts won't exceed i64::MAX
    pub(crate) fn observe_sweep(&self, pruned: usize, reclaimed: usize, series: usize, points: usize) {
        self.points_pruned.inc_by(pruned as u64);
        self.series_reclaimed.inc_by(reclaimed as u64);
        self.series.set(series as i64);
        self.points.set(points as i64);
    }

    /// Returns the number of batches ingested so far.
    #[must_use]
    pub fn batches(&self) -> u64 {
        self.batches.get()
    }

    /// Returns the number of points recorded so far.
    #[must_use]
    pub fn points_recorded(&self) -> u64 {
        self.points_recorded.get()
    }

    /// Returns the number of points pruned so far.
    #[must_use]
    pub fn points_pruned(&self) -> u64 {
        self.points_pruned.get()
    }

    /// Returns the number of series reclaimed so far.
    #[must_use]
    pub fn series_reclaimed(&self) -> u64 {
        self.series_reclaimed.get()
    }

    /// Returns the number of series retained after the last ingest or sweep.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Value is always non-negative
    pub fn series(&self) -> u64 {
        self.series.get() as u64
    }

    /// Returns the number of points retained after the last ingest or sweep.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Value is always non-negative
    pub fn points(&self) -> u64 {
        self.points.get() as u64
    }
}

/// Registry holding the sink metrics, encodable in Prometheus text format.
#[derive(Clone)]
pub struct PrometheusRegistry {
    registry: Arc<RwLock<Registry>>,
    sink_metrics: SinkMetrics,
}

impl std::fmt::Debug for PrometheusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusRegistry")
            .field("sink_metrics", &self.sink_metrics)
            .finish_non_exhaustive()
    }
}

impl Default for PrometheusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusRegistry {
    /// Creates a registry with the sink metrics registered.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let sink_metrics = SinkMetrics::register(&mut registry);

        Self {
            registry: Arc::new(RwLock::new(registry)),
            sink_metrics,
        }
    }

    /// Returns the sink metrics, to be attached with
    /// [`MetricSink::with_metrics`](crate::MetricSink::with_metrics).
    #[must_use]
    pub const fn sink_metrics(&self) -> &SinkMetrics {
        &self.sink_metrics
    }

    /// Encodes all metrics in Prometheus text format.
    #[must_use]
    pub fn encode(&self) -> String {
        let registry = self.registry.read();
        let mut buffer = String::new();
        if encode(&mut buffer, &registry).is_err() {
            tracing::error!("failed to encode prometheus metrics");
            return String::new();
        }
        buffer
    }

    /// Returns the Content-Type header value for Prometheus metrics.
    #[must_use]
    pub const fn content_type() -> &'static str {
        "text/plain; version=0.0.4; charset=utf-8"
    }
}
