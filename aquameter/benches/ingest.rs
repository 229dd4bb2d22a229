//! Benchmarks for the ingestion path and aggregation passes.
//!
//! Run with: `cargo bench -p aquameter`

#![allow(missing_docs, clippy::cast_precision_loss, clippy::unwrap_used)]

use std::sync::Arc;

use aquameter::aggregate::AggregationEngine;
use aquameter::ingest::IngestGateway;
use aquameter::measurement::{Measurement, StatType};
use aquameter::resolution::Width;
use aquameter::store::{PointStore, Store};
use aquameter::time::TimeRange;
use chrono::{DateTime, TimeDelta, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tempfile::tempdir;

const BASE_SECS: i64 = 1_700_000_000;

fn base() -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_SECS, 0).unwrap()
}

/// Fills a store with `sensors` sensors reporting every 10 seconds for
/// `minutes` minutes.
fn seeded_store(sensors: usize, minutes: i64) -> Store {
    let store = Store::in_memory("measurements");
    let mut points = Vec::new();
    for step in 0..minutes * 6 {
        for sensor in 0..sensors {
            points.push(
                Measurement {
                    sensor_id: format!("sensor_{sensor:03}"),
                    timestamp: base() + TimeDelta::seconds(step * 10),
                    temperature: 18.0 + (step % 50) as f64 * 0.1,
                    conductivity: 1500.0 + sensor as f64,
                }
                .to_point("measurements"),
            );
        }
    }
    store.write_points(&points).unwrap();
    store
}

fn bench_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit");

    let gateway = IngestGateway::new(Arc::new(Store::in_memory("measurements")), "measurements");
    let mut step = 0i64;
    group.bench_function("memory", |b| {
        b.iter(|| {
            step += 1;
            let timestamp = (base() + TimeDelta::seconds(step)).to_rfc3339();
            let body = format!(
                r#"{{"sensor_id":"sensor_001","timestamp":"{timestamp}","temperature":21.5,"conductivity":1834.0}}"#
            );
            gateway.submit(black_box(body.as_bytes())).unwrap();
        });
    });

    let temp_dir = tempdir().unwrap();
    let store = Store::open_dir(temp_dir.path().join("bench_store"), "measurements").unwrap();
    let gateway = IngestGateway::new(Arc::new(store), "measurements");
    let mut step = 0i64;
    group.bench_function("file", |b| {
        b.iter(|| {
            step += 1;
            let timestamp = (base() + TimeDelta::seconds(step)).to_rfc3339();
            let body = format!(
                r#"{{"sensor_id":"sensor_001","timestamp":"{timestamp}","temperature":21.5,"conductivity":1834.0}}"#
            );
            gateway.submit(black_box(body.as_bytes())).unwrap();
        });
    });

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_range");

    for sensors in [1usize, 10, 100] {
        let store = seeded_store(sensors, 60);
        let engine = AggregationEngine::new(&store, "measurements");
        let range = TimeRange::new(base(), base() + TimeDelta::minutes(60));
        let now = base() + TimeDelta::hours(2);

        group.bench_with_input(BenchmarkId::new("1m_all_stats", sensors), &sensors, |b, _| {
            b.iter(|| {
                engine
                    .aggregate_range(Width::OneMinute, black_box(&StatType::ALL), range, now)
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_submit, bench_aggregate);
criterion_main!(benches);
