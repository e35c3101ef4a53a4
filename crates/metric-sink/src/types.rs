//! Core types for the metric sink.
//!
//! This module provides the data model flowing through the sink:
//! - [`MetricValue`]: An integer or floating-point measurement, never coerced
//! - [`MetricPoint`]: A value tagged with its opaque [`MetricKind`]
//! - [`EntitySnapshot`]: Labels plus the metrics one entity reported in a cycle
//! - [`Batch`]: One collection cycle, a timestamp plus many entity snapshots
//! - [`TimestampedValue`]: A retained point as returned by queries
//! - [`TimeRange`]: A half-open query window

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Descriptive key/value metadata attached to entities and labeled metrics.
pub type Labels = HashMap<String, String>;

/// A measured value.
///
/// The sink preserves whichever representation the producer supplied; an
/// integer stays an integer through storage and query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    /// A signed integer value (counters, byte counts).
    Int(i64),
    /// A floating-point value (rates, ratios).
    Float(f64),
}

impl MetricValue {
    /// Returns the integer payload, if this is an integer value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(_) => None,
        }
    }

    /// Returns the float payload, if this is a floating-point value.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(_) => None,
            Self::Float(v) => Some(*v),
        }
    }

    /// Returns the value widened to `f64`, whatever its representation.
    #[must_use]
    pub const fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }

    /// Returns true if this is an integer value.
    #[must_use]
    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// How a metric's values relate over time.
///
/// Carried through the sink untouched; the sink never derives rates or
/// deltas from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// A point-in-time reading.
    #[default]
    Gauge,
    /// A monotonically increasing total since some start time.
    Cumulative,
    /// The change since the previous reading.
    Delta,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gauge => "gauge",
            Self::Cumulative => "cumulative",
            Self::Delta => "delta",
        };
        f.write_str(s)
    }
}

/// One measurement as reported by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// The measured value.
    pub value: MetricValue,
    /// The metric kind tag.
    #[serde(default)]
    pub kind: MetricKind,
}

impl MetricPoint {
    /// Creates a new metric point.
    #[must_use]
    pub fn new(value: impl Into<MetricValue>, kind: MetricKind) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    /// Creates a gauge point.
    #[must_use]
    pub fn gauge(value: impl Into<MetricValue>) -> Self {
        Self::new(value, MetricKind::Gauge)
    }

    /// Creates a cumulative point.
    #[must_use]
    pub fn cumulative(value: impl Into<MetricValue>) -> Self {
        Self::new(value, MetricKind::Cumulative)
    }

    /// Creates a delta point.
    #[must_use]
    pub fn delta(value: impl Into<MetricValue>) -> Self {
        Self::new(value, MetricKind::Delta)
    }
}

/// A metric that carries its own labels in addition to the entity's,
/// such as filesystem usage keyed by device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMetric {
    /// The metric name.
    pub name: String,
    /// Labels distinguishing this metric from others of the same name.
    pub labels: Labels,
    /// The measurement.
    pub point: MetricPoint,
}

impl LabeledMetric {
    /// Creates a new labeled metric with no labels.
    #[must_use]
    pub fn new(name: impl Into<String>, point: MetricPoint) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            point,
        }
    }

    /// Adds a label and returns self for chaining.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Everything one entity reported in a single collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Descriptive labels of the entity (type, namespace, node...).
    #[serde(default)]
    pub labels: Labels,
    /// Unlabeled metrics by name.
    #[serde(default)]
    pub metrics: HashMap<String, MetricPoint>,
    /// Metrics carrying their own label set.
    #[serde(default)]
    pub labeled_metrics: Vec<LabeledMetric>,
}

impl EntitySnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity label and returns self for chaining.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an unlabeled metric and returns self for chaining.
    #[must_use]
    pub fn metric(mut self, name: impl Into<String>, point: MetricPoint) -> Self {
        self.metrics.insert(name.into(), point);
        self
    }

    /// Adds a labeled metric and returns self for chaining.
    #[must_use]
    pub fn labeled_metric(mut self, metric: LabeledMetric) -> Self {
        self.labeled_metrics.push(metric);
        self
    }

    /// Returns the number of points in this snapshot, labeled ones included.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.metrics.len() + self.labeled_metrics.len()
    }
}

/// One ingestion unit: a single timestamp and the snapshots of many entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// The collection timestamp shared by every point in the batch.
    pub timestamp: DateTime<Utc>,
    /// Snapshots keyed by entity.
    #[serde(default)]
    pub entities: HashMap<EntityId, EntitySnapshot>,
}

impl Batch {
    /// Creates an empty batch at the given timestamp.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            entities: HashMap::new(),
        }
    }

    /// Creates an empty batch stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Adds an entity snapshot and returns self for chaining.
    #[must_use]
    pub fn entity(mut self, id: impl Into<EntityId>, snapshot: EntitySnapshot) -> Self {
        self.entities.insert(id.into(), snapshot);
        self
    }

    /// Returns the total number of points carried by this batch.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.entities.values().map(EntitySnapshot::point_count).sum()
    }
}

/// A retained point as returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedValue {
    /// When the point was collected.
    pub timestamp: DateTime<Utc>,
    /// The value, in its original representation.
    pub value: MetricValue,
    /// The metric kind tag.
    pub kind: MetricKind,
    /// The entity labels at the time the point was collected.
    pub labels: Labels,
}

/// A half-open time window `[start, end)`.
///
/// A range whose end is not after its start is empty rather than invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start instant (inclusive).
    pub start: DateTime<Utc>,
    /// End instant (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new time range.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Creates a range covering the given duration up to now.
    ///
    /// Durations too large to represent saturate to an unbounded start.
    #[must_use]
    pub fn last(duration: std::time::Duration) -> Self {
        let end = Utc::now();
        let start = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| end.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    /// Checks if a timestamp falls within this range (start inclusive, end exclusive).
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Returns true if no timestamp can fall within this range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
