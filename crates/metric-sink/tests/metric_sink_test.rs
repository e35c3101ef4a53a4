//! End-to-end tests for the metric sink.
//!
//! These tests verify:
//! 1. Dual retention across three ingested batches
//! 2. Half-open range filtering
//! 3. Metric name listing per entity
//! 4. Concurrent ingestion and queries through shared handles

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use metric_sink::{
    Batch, DataSink, EntityId, EntitySnapshot, MetricPoint, MetricSink, MetricValue,
    SinkConfig, TimestampedValue,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pod_snapshot(metrics: &[(&str, i64)]) -> EntitySnapshot {
    metrics.iter().fold(
        EntitySnapshot::new()
            .label("type", "pod")
            .label("namespace_name", "ns1"),
        |snapshot, (name, value)| snapshot.metric(*name, MetricPoint::gauge(*value)),
    )
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

fn int_values(result: &HashMap<EntityId, Vec<TimestampedValue>>, id: &EntityId) -> Vec<i64> {
    result[id]
        .iter()
        .map(|v| v.value.as_int().expect("integer value"))
        .collect()
}

/// Ingests the three batches used throughout: `key` reports m1 and m2 at
/// T-180s, T-60s and T-20s; `other` reports m1 only at T-20s.
fn ingest_scenario(sink: &MetricSink, now: DateTime<Utc>, key: &EntityId, other: &EntityId) {
    let batch1 = Batch::new(now - secs(180)).entity(key.clone(), pod_snapshot(&[("m1", 60), ("m2", 666)]));
    let batch2 = Batch::new(now - secs(60)).entity(key.clone(), pod_snapshot(&[("m1", 40), ("m2", 444)]));
    let batch3 = Batch::new(now - secs(20))
        .entity(key.clone(), pod_snapshot(&[("m1", 20), ("m2", 222)]))
        .entity(other.clone(), pod_snapshot(&[("m1", 123)]));

    sink.export_data(&batch1);
    sink.export_data(&batch2);
    sink.export_data(&batch3);
}

fn scenario_sink() -> MetricSink {
    MetricSink::new(Duration::from_secs(45), Duration::from_secs(120), ["m1"]).unwrap()
}

#[test]
fn test_get_metrics() {
    init_tracing();
    let now = Utc::now();
    let key = EntityId::pod("ns1", "pod1");
    let other = EntityId::pod("ns1", "other");

    let sink = scenario_sink();
    ingest_scenario(&sink, now, &key, &other);

    // batch1 is discarded by the extended retention
    let result = sink.get_metric("m1", &[key.clone()], now - secs(120), now);
    assert_eq!(int_values(&result, &key), vec![40, 20]);
    assert_eq!(result[&key][0].timestamp, now - secs(60));
    assert_eq!(result[&key][1].timestamp, now - secs(20));

    let result = sink.get_metric("m1", &[other.clone()], now - secs(120), now);
    assert_eq!(int_values(&result, &other), vec![123]);

    // batch1 is discarded by retention and batch2 is outside the window
    let result = sink.get_metric("m1", &[key.clone()], now - secs(30), now);
    assert_eq!(int_values(&result, &key), vec![20]);

    // batch1 and batch2 are discarded by the default retention
    let result = sink.get_metric("m2", &[key.clone()], now - secs(120), now);
    assert_eq!(int_values(&result, &key), vec![222]);

    // nothing is in the window
    let result = sink.get_metric("m2", &[key.clone()], now - secs(10), now);
    assert!(result[&key].is_empty());

    let names = sink.get_metric_names(&key);
    assert_eq!(names.len(), 2);
    assert!(names.contains("m1"));
    assert!(names.contains("m2"));
}

#[test]
fn test_get_metrics_with_fixed_clock() {
    let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    let key = EntityId::pod("ns1", "pod1");
    let other = EntityId::pod("ns1", "other");

    let sink = scenario_sink();
    for (offset, m1, m2) in [(180, 60, 666), (60, 40, 444)] {
        let batch = Batch::new(now - secs(offset)).entity(key.clone(), pod_snapshot(&[("m1", m1), ("m2", m2)]));
        sink.ingest_at(&batch, now);
    }
    let batch3 = Batch::new(now - secs(20))
        .entity(key.clone(), pod_snapshot(&[("m1", 20), ("m2", 222)]))
        .entity(other.clone(), pod_snapshot(&[("m1", 123)]));
    sink.ingest_at(&batch3, now);

    let result = sink.get_metric("m1", &[key.clone(), other.clone()], now - secs(120), now);
    assert_eq!(int_values(&result, &key), vec![40, 20]);
    assert_eq!(int_values(&result, &other), vec![123]);

    let result = sink.get_metric("m2", &[key.clone()], now - secs(120), now);
    assert_eq!(int_values(&result, &key), vec![222]);
}

#[test]
fn test_extended_metric_outlives_default_metric() {
    let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    let id = EntityId::node("n1");
    let sink = scenario_sink();

    sink.ingest_at(
        &Batch::new(start).entity(id.clone(), pod_snapshot(&[("m1", 1), ("m2", 2)])),
        start,
    );

    // 60s later: past the 45s default window, inside the 120s extended one.
    sink.sweep(start + secs(60));
    let names: Vec<_> = sink.get_metric_names(&id).into_iter().collect();
    assert_eq!(names, vec!["m1"]);

    // 121s later: past both.
    sink.sweep(start + secs(121));
    assert!(sink.get_metric_names(&id).is_empty());
    assert!(sink.is_empty());
}

#[test]
fn test_classification_is_independent_of_entity() {
    let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    let sink = scenario_sink();
    let ids: Vec<EntityId> = (0..5).map(|i| EntityId::pod("ns", &format!("p{i}"))).collect();

    let batch = ids.iter().fold(Batch::new(now - secs(100)), |batch, id| {
        batch.entity(id.clone(), pod_snapshot(&[("m1", 1), ("m2", 2)]))
    });
    sink.ingest_at(&batch, now);

    let m1 = sink.get_metric("m1", &ids, now - secs(200), now);
    let m2 = sink.get_metric("m2", &ids, now - secs(200), now);
    for id in &ids {
        assert_eq!(m1[id].len(), 1, "m1 should survive for {id}");
        assert!(m2[id].is_empty(), "m2 should be pruned for {id}");
    }
}

#[test]
fn test_late_batch_is_inserted_in_order() {
    let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    let id = EntityId::from("e");
    let sink = scenario_sink();

    for offset in [10, 50, 30] {
        let batch = Batch::new(now - secs(offset)).entity(id.clone(), pod_snapshot(&[("m1", offset)]));
        sink.ingest_at(&batch, now);
    }

    let result = sink.get_metric("m1", &[id.clone()], now - secs(120), now);
    assert_eq!(int_values(&result, &id), vec![50, 30, 10]);
    assert!(result[&id].windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_float_values_survive_round_trip() {
    let now = Utc::now();
    let id = EntityId::from("e");
    let sink = MetricSink::from_config(&SinkConfig::default()).unwrap();

    sink.ingest(&Batch::new(now - secs(1)).entity(
        id.clone(),
        EntitySnapshot::new().metric("cpu/usage_rate", MetricPoint::gauge(0.25)),
    ));

    let result = sink.get_metric("cpu/usage_rate", &[id.clone()], now - secs(10), now);
    assert_eq!(result[&id][0].value, MetricValue::Float(0.25));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_and_queries() {
    init_tracing();
    let sink = MetricSink::new(Duration::from_secs(3600), Duration::from_secs(7200), ["m1"]).unwrap();
    let base = Utc::now() - secs(600);
    let ids: Vec<EntityId> = (0..10).map(|i| EntityId::pod("ns", &format!("p{i}"))).collect();

    let producer = {
        let sink = sink.clone();
        let ids = ids.clone();
        tokio::task::spawn_blocking(move || {
            for cycle in 0..100_i64 {
                let batch = ids.iter().fold(Batch::new(base + secs(cycle)), |batch, id| {
                    batch.entity(id.clone(), pod_snapshot(&[("m1", cycle), ("m2", cycle)]))
                });
                sink.ingest(&batch);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let sink = sink.clone();
            let ids = ids.clone();
            tokio::task::spawn_blocking(move || {
                for _ in 0..200 {
                    let result = sink.get_metric("m1", &ids, base, Utc::now());
                    // Batches are applied atomically: every entity has the same count.
                    let counts: Vec<_> = ids.iter().map(|id| result[id].len()).collect();
                    assert!(counts.windows(2).all(|w| w[0] == w[1]));
                    for id in &ids {
                        assert!(result[id].windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
                    }
                }
            })
        })
        .collect();

    producer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    let result = sink.get_metric("m1", &ids, base, Utc::now());
    for id in &ids {
        assert_eq!(result[id].len(), 100);
    }
    assert_eq!(sink.series_count(), 20);
    assert_eq!(sink.point_count(), 2000);
}
