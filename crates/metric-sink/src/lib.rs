//! In-memory retention cache for periodic metric batches.
#![forbid(unsafe_code)]
//!
//! `metric-sink` receives a [`Batch`] of timestamped measurements keyed by
//! monitored entity once per collection cycle, retains every
//! (entity, metric) series for a bounded window, and answers range queries
//! for dashboards and alerting.
//!
//! # Features
//!
//! - **Two retention classes**: a short default window for everything, and an
//!   extended window for a whitelist of metric names
//! - **Ordered series**: late batches are inserted in place, never appended blindly
//! - **Half-open range queries**: `start <= timestamp < end`, oldest first
//! - **Untouched values**: integer and float payloads keep their representation
//! - **Shared handle**: clone the sink to hand it to producer and readers
//!
//! # Example
//!
//! ```rust
//! use metric_sink::{Batch, EntityId, EntitySnapshot, MetricPoint, MetricSink};
//! use chrono::{Duration as Delta, Utc};
//! use std::time::Duration;
//!
//! // 45s for most metrics, 120s for "m1"
//! let sink = MetricSink::new(Duration::from_secs(45), Duration::from_secs(120), ["m1"]).unwrap();
//!
//! let pod = EntityId::pod("ns1", "pod1");
//! let now = Utc::now();
//! sink.ingest(
//!     &Batch::new(now - Delta::seconds(20))
//!         .entity(pod.clone(), EntitySnapshot::new().metric("m1", MetricPoint::gauge(20_i64))),
//! );
//!
//! let result = sink.get_metric("m1", &[pod.clone()], now - Delta::seconds(120), now);
//! assert_eq!(result[&pod].len(), 1);
//! assert!(sink.get_metric_names(&pod).contains("m1"));
//! ```

#![doc(html_root_url = "https://docs.rs/metric-sink/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod entity;
pub mod error;
pub mod exporter;
pub mod retention;
mod series;
pub mod sink;
pub mod types;

#[cfg(feature = "prometheus")]
pub mod prometheus;

// Re-export main types at crate root
pub use config::SinkConfig;
pub use entity::{EntityId, EntityType};
pub use error::{Result, SinkError};
pub use exporter::DataSink;
pub use retention::{RetentionClass, RetentionPolicy};
pub use sink::MetricSink;
pub use types::{
    Batch, EntitySnapshot, LabeledMetric, Labels, MetricKind, MetricPoint, MetricValue, TimeRange,
    TimestampedValue,
};
