//! The sink seam between the batch producer and its consumers.
//!
//! The producer hands every collected [`Batch`] to each registered
//! [`DataSink`]; the [`MetricSink`] is one such sink.

use tracing::debug;

use crate::sink::MetricSink;
use crate::types::Batch;

/// A destination for collected metric batches.
///
/// Implementations must not retain the batch itself; they copy whatever
/// they need before returning.
pub trait DataSink: Send + Sync {
    /// Returns the name of this sink for logging purposes.
    fn name(&self) -> &'static str;

    /// Delivers one batch. Best effort: there is no result.
    fn export_data(&self, batch: &Batch);

    /// Releases any resources held by the sink.
    fn stop(&self);
}

impl DataSink for MetricSink {
    fn name(&self) -> &'static str {
        "Metric Sink"
    }

    fn export_data(&self, batch: &Batch) {
        self.ingest(batch);
    }

    fn stop(&self) {
        // Volatile state; nothing to flush.
        debug!(series = self.series_count(), "stopping metric sink");
    }
}
