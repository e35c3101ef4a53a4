//! The metric sink: a shared, in-memory retention cache.
//!
//! This module provides [`MetricSink`], which records every point of every
//! ingested [`Batch`] into a per-(entity, metric) retained series and answers
//! range queries over them.
//!
//! # Pruning
//!
//! Pruning is eager. Recording a point prunes the series it lands in, and
//! each ingested batch ends with a sweep that prunes every series against the
//! ingestion clock and drops the ones left empty. Queries never prune, so an
//! entry can remain visible for at most one ingestion interval past its
//! retention window.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::{BTreeMap, BTreeSet};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::config::SinkConfig;
use crate::entity::{
    EntityId, EntityType, LABEL_CONTAINER_NAME, LABEL_NAMESPACE, LABEL_NODE_NAME, LABEL_POD_NAME,
};
use crate::error::Result;
use crate::retention::{RetentionClass, RetentionPolicy};
use crate::series::RetainedSeries;
use crate::types::{Batch, Labels, MetricPoint, TimeRange, TimestampedValue};

#[cfg(feature = "prometheus")]
use crate::prometheus::SinkMetrics;

/// Labels of a labeled metric in a hashable, ordered form.
type MetricLabels = BTreeMap<String, String>;

/// Flat composite key of a retained series.
///
/// Ordered by entity first so that all series of one entity are adjacent.
/// Unlabeled metrics use an empty label set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct SeriesKey {
    entity: EntityId,
    metric: String,
    metric_labels: MetricLabels,
}

impl SeriesKey {
    fn new(entity: EntityId, metric: String, metric_labels: MetricLabels) -> Self {
        Self {
            entity,
            metric,
            metric_labels,
        }
    }

    /// The smallest key belonging to `entity`.
    fn first_of(entity: &EntityId) -> Self {
        Self::new(entity.clone(), String::new(), MetricLabels::new())
    }
}

type SeriesMap = BTreeMap<SeriesKey, RetainedSeries>;

/// What one ingestion pass did, for logging and self-metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct IngestSummary {
    pub(crate) entities: usize,
    pub(crate) points_recorded: usize,
    pub(crate) points_pruned: usize,
    pub(crate) series_reclaimed: usize,
    pub(crate) series: usize,
    pub(crate) points: usize,
}

/// Result of sweeping every series.
#[derive(Debug, Clone, Copy, Default)]
struct SweepStats {
    pruned: usize,
    reclaimed: usize,
    series: usize,
    points: usize,
}

/// Thread-safe retention cache for metric batches.
///
/// Cloning a sink is cheap and yields a handle to the same data, so the
/// producer and any number of readers can each own one.
#[derive(Debug, Clone)]
pub struct MetricSink {
    policy: Arc<RetentionPolicy>,
    series: Arc<RwLock<SeriesMap>>,
    #[cfg(feature = "prometheus")]
    metrics: Option<SinkMetrics>,
}

impl MetricSink {
    /// Creates a sink with the given retentions and extended-retention whitelist.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::InvalidRetention` if either retention is zero or
    /// cannot be represented.
    pub fn new<I, S>(default_retention: Duration, extended_retention: Duration, extended: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let policy = RetentionPolicy::new(default_retention, extended_retention, extended)?;
        Ok(Self::with_policy(policy))
    }

    /// Creates a sink from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        let policy = RetentionPolicy::from_config(config)?;
        Ok(Self::with_policy(policy))
    }

    fn with_policy(policy: RetentionPolicy) -> Self {
        info!(
            default_retention_secs = policy.window(RetentionClass::Default).num_seconds(),
            extended_retention_secs = policy.window(RetentionClass::Extended).num_seconds(),
            extended_metrics = policy.extended_metrics().len(),
            "created metric sink"
        );
        Self {
            policy: Arc::new(policy),
            series: Arc::new(RwLock::new(SeriesMap::new())),
            #[cfg(feature = "prometheus")]
            metrics: None,
        }
    }

    /// Attaches self-metrics that are updated on every ingested batch.
    #[cfg(feature = "prometheus")]
    #[must_use]
    pub fn with_metrics(mut self, metrics: SinkMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the retention policy.
    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Returns the retention window applied to a metric name.
    #[must_use]
    pub fn retention_for(&self, metric: &str) -> chrono::Duration {
        self.policy.retention_for(metric)
    }

    /// Records one point, pruning its series against the current time.
    pub fn record(
        &self,
        entity: &EntityId,
        metric: &str,
        timestamp: DateTime<Utc>,
        point: MetricPoint,
        labels: &Labels,
    ) {
        self.record_at(entity, metric, timestamp, point, labels, Utc::now());
    }

    /// Records one point, pruning its series against `now`.
    ///
    /// The point is inserted at its ordered position, so late points never
    /// break the ascending order of the series.
    pub fn record_at(
        &self,
        entity: &EntityId,
        metric: &str,
        timestamp: DateTime<Utc>,
        point: MetricPoint,
        labels: &Labels,
        now: DateTime<Utc>,
    ) {
        let key = SeriesKey::new(entity.clone(), metric.to_string(), MetricLabels::new());
        let mut series = self.series.write();
        record_locked(&mut series, &self.policy, key, timestamp, point, labels, now);
    }

    /// Ingests a batch against the current time.
    pub fn ingest(&self, batch: &Batch) {
        self.ingest_at(batch, Utc::now());
    }

    /// Ingests a batch, using `now` as the reference instant for pruning.
    ///
    /// The whole batch is applied under one write lock, so readers observe
    /// either none or all of it.
    pub fn ingest_at(&self, batch: &Batch, now: DateTime<Utc>) {
        let ts = batch.timestamp;
        if now.signed_duration_since(ts) > self.policy.longest() {
            warn!(
                batch_timestamp = %ts,
                now = %now,
                "batch is older than the longest retention window, its points will be pruned immediately"
            );
        }

        let mut summary = IngestSummary {
            entities: batch.entities.len(),
            ..IngestSummary::default()
        };

        let stats = {
            let mut series = self.series.write();

            for (entity, snapshot) in &batch.entities {
                for (metric, point) in &snapshot.metrics {
                    let key = SeriesKey::new(entity.clone(), metric.clone(), MetricLabels::new());
                    summary.points_pruned +=
                        record_locked(&mut series, &self.policy, key, ts, *point, &snapshot.labels, now);
                    summary.points_recorded += 1;
                }
                for labeled in &snapshot.labeled_metrics {
                    let key = SeriesKey::new(
                        entity.clone(),
                        labeled.name.clone(),
                        to_metric_labels(&labeled.labels),
                    );
                    summary.points_pruned += record_locked(
                        &mut series,
                        &self.policy,
                        key,
                        ts,
                        labeled.point,
                        &snapshot.labels,
                        now,
                    );
                    summary.points_recorded += 1;
                }
            }

            sweep_locked(&mut series, &self.policy, now)
        };

        summary.points_pruned += stats.pruned;
        summary.series_reclaimed = stats.reclaimed;
        summary.series = stats.series;
        summary.points = stats.points;

        debug!(
            batch_timestamp = %ts,
            entities = summary.entities,
            points_recorded = summary.points_recorded,
            points_pruned = summary.points_pruned,
            series_reclaimed = summary.series_reclaimed,
            series = summary.series,
            points = summary.points,
            "ingested batch"
        );

        #[cfg(feature = "prometheus")]
        if let Some(metrics) = &self.metrics {
            metrics.observe(&summary);
        }
    }

    /// Prunes every series against `now` and drops the ones left empty.
    ///
    /// Ingestion already does this; calling it directly is only useful when
    /// ingestion has stopped and memory should still be reclaimed.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let stats = {
            let mut series = self.series.write();
            sweep_locked(&mut series, &self.policy, now)
        };
        debug!(
            points_pruned = stats.pruned,
            series_reclaimed = stats.reclaimed,
            series = stats.series,
            "swept metric sink"
        );

        #[cfg(feature = "prometheus")]
        if let Some(metrics) = &self.metrics {
            metrics.observe_sweep(stats.pruned, stats.reclaimed, stats.series, stats.points);
        }
    }

    /// Returns, for each requested entity, its points of `metric` with
    /// `start <= timestamp < end`, oldest first.
    ///
    /// Every requested entity appears in the result; unknown entities and
    /// unknown metrics yield empty sequences.
    #[must_use]
    pub fn get_metric(
        &self,
        metric: &str,
        entities: &[EntityId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HashMap<EntityId, Vec<TimestampedValue>> {
        self.query(metric, &MetricLabels::new(), entities, TimeRange::new(start, end))
    }

    /// Like [`get_metric`](Self::get_metric), for the labeled metric whose
    /// label set equals `labels` exactly.
    #[must_use]
    pub fn get_labeled_metric(
        &self,
        metric: &str,
        labels: &Labels,
        entities: &[EntityId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HashMap<EntityId, Vec<TimestampedValue>> {
        self.query(
            metric,
            &to_metric_labels(labels),
            entities,
            TimeRange::new(start, end),
        )
    }

    fn query(
        &self,
        metric: &str,
        metric_labels: &MetricLabels,
        entities: &[EntityId],
        range: TimeRange,
    ) -> HashMap<EntityId, Vec<TimestampedValue>> {
        let series = self.series.read();
        entities
            .iter()
            .map(|entity| {
                let key = SeriesKey::new(entity.clone(), metric.to_string(), metric_labels.clone());
                let values = series
                    .get(&key)
                    .map(|s| s.range(&range))
                    .unwrap_or_default();
                (entity.clone(), values)
            })
            .collect()
    }

    /// Returns the names of the metrics `entity` currently has retained points for.
    #[must_use]
    pub fn get_metric_names(&self, entity: &EntityId) -> BTreeSet<String> {
        let series = self.series.read();
        series
            .range(SeriesKey::first_of(entity)..)
            .take_while(|(key, _)| key.entity == *entity)
            .filter(|(_, s)| !s.is_empty())
            .map(|(key, _)| key.metric.clone())
            .collect()
    }

    /// Returns the timestamp of the newest retained point of an unlabeled metric.
    #[must_use]
    pub fn latest_timestamp(&self, entity: &EntityId, metric: &str) -> Option<DateTime<Utc>> {
        let key = SeriesKey::new(entity.clone(), metric.to_string(), MetricLabels::new());
        let series = self.series.read();
        series.get(&key).and_then(|s| s.latest()).map(|e| e.timestamp)
    }

    /// Returns every entity that has at least one retained point, sorted.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let series = self.series.read();
        let mut ids: Vec<EntityId> = Vec::new();
        for (key, s) in series.iter() {
            if s.is_empty() || ids.last() == Some(&key.entity) {
                continue;
            }
            ids.push(key.entity.clone());
        }
        ids
    }

    /// Returns the names of all nodes.
    #[must_use]
    pub fn nodes(&self) -> Vec<String> {
        self.names_where(EntityType::Node, |_| true, |labels| label(labels, LABEL_NODE_NAME))
    }

    /// Returns the names of all namespaces.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        self.names_where(EntityType::Namespace, |_| true, |labels| {
            label(labels, LABEL_NAMESPACE)
        })
    }

    /// Returns all pods as `namespace/pod`.
    #[must_use]
    pub fn pods(&self) -> Vec<String> {
        self.names_where(EntityType::Pod, |_| true, |labels| {
            let namespace = label(labels, LABEL_NAMESPACE)?;
            let pod = label(labels, LABEL_POD_NAME)?;
            Some(format!("{namespace}/{pod}"))
        })
    }

    /// Returns the names of the pods in a namespace.
    #[must_use]
    pub fn pods_in_namespace(&self, namespace: &str) -> Vec<String> {
        self.names_where(
            EntityType::Pod,
            |labels| has_label(labels, LABEL_NAMESPACE, namespace),
            |labels| label(labels, LABEL_POD_NAME),
        )
    }

    /// Returns the names of the containers of a pod.
    #[must_use]
    pub fn containers_in_pod(&self, namespace: &str, pod: &str) -> Vec<String> {
        self.names_where(
            EntityType::PodContainer,
            |labels| {
                has_label(labels, LABEL_NAMESPACE, namespace) && has_label(labels, LABEL_POD_NAME, pod)
            },
            |labels| label(labels, LABEL_CONTAINER_NAME),
        )
    }

    /// Returns the names of the system containers running on a node.
    #[must_use]
    pub fn system_containers_on_node(&self, node: &str) -> Vec<String> {
        self.names_where(
            EntityType::SystemContainer,
            |labels| has_label(labels, LABEL_NODE_NAME, node),
            |labels| label(labels, LABEL_CONTAINER_NAME),
        )
    }

    /// Collects a sorted, deduplicated name for every entity of type `ty`
    /// whose most recent labels satisfy `filter`.
    fn names_where<F, N>(&self, ty: EntityType, filter: F, name: N) -> Vec<String>
    where
        F: Fn(&Labels) -> bool,
        N: Fn(&Labels) -> Option<String>,
    {
        let series = self.series.read();

        // Most recent labels per entity; series of one entity are adjacent.
        let mut latest: Vec<(&EntityId, DateTime<Utc>, &Labels)> = Vec::new();
        for (key, s) in series.iter() {
            let Some(entry) = s.latest() else { continue };
            let candidate = (&key.entity, entry.timestamp, &entry.labels);
            match latest.last_mut() {
                Some(last) if last.0 == &key.entity => {
                    if entry.timestamp > last.1 {
                        *last = candidate;
                    }
                }
                _ => latest.push(candidate),
            }
        }

        latest
            .into_iter()
            .map(|(_, _, labels)| labels)
            .filter(|&labels| EntityType::of(labels) == Some(ty) && filter(labels))
            .filter_map(name)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Returns the number of retained series.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Returns the number of retained points across all series.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.series.read().values().map(RetainedSeries::len).sum()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.read().values().all(RetainedSeries::is_empty)
    }
}

/// Inserts one point and prunes its series. Returns the number of pruned points.
fn record_locked(
    series: &mut SeriesMap,
    policy: &RetentionPolicy,
    key: SeriesKey,
    timestamp: DateTime<Utc>,
    point: MetricPoint,
    labels: &Labels,
    now: DateTime<Utc>,
) -> usize {
    let cutoff = policy.cutoff(&key.metric, now);
    trace!(
        entity = %key.entity,
        metric = %key.metric,
        timestamp = %timestamp,
        value = %point.value,
        "recording point"
    );

    match series.entry(key) {
        MapEntry::Occupied(mut occupied) => {
            let s = occupied.get_mut();
            s.insert(timestamp, point, labels.clone());
            let pruned = s.prune(cutoff);
            if s.is_empty() {
                occupied.remove();
            }
            pruned
        }
        MapEntry::Vacant(vacant) => {
            let mut s = RetainedSeries::new();
            s.insert(timestamp, point, labels.clone());
            let pruned = s.prune(cutoff);
            if !s.is_empty() {
                vacant.insert(s);
            }
            pruned
        }
    }
}

fn sweep_locked(series: &mut SeriesMap, policy: &RetentionPolicy, now: DateTime<Utc>) -> SweepStats {
    let mut stats = SweepStats::default();
    let before = series.len();

    series.retain(|key, s| {
        stats.pruned += s.prune(policy.cutoff(&key.metric, now));
        stats.points += s.len();
        !s.is_empty()
    });

    stats.series = series.len();
    stats.reclaimed = before - stats.series;
    stats
}

fn to_metric_labels(labels: &Labels) -> MetricLabels {
    labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn label(labels: &Labels, key: &str) -> Option<String> {
    labels.get(key).cloned()
}

fn has_label(labels: &Labels, key: &str, value: &str) -> bool {
    labels.get(key).is_some_and(|v| v == value)
}
