//! Aggregation engine: downsampling raw measurements into fixed-width windows.
//!
//! The engine reads a closed range of the raw series, groups samples into
//! epoch-aligned windows of one [`Width`], applies a [`StatType`] per window
//! and field, and writes the results to the width's derived series.
//!
//! # Design
//!
//! - Windows are `[start, start + width)` with `start` divisible by the width
//!   since the epoch, so windows of one width tile time without overlap
//! - Only windows lying wholly inside the requested range and ending no later
//!   than the run time are emitted
//! - Windows without samples produce no row
//! - Derived rows are tagged with the source tags plus `stat_type`, so tasks
//!   for different statistics never write the same key
//! - Writes go through [`PointStore::write_points`], which drops rows equal
//!   to what is already stored; re-running a range is a no-op
//!
//! # Aggregation Flow
//!
//! ```text
//! measurements ─┐
//!               ├─► AggregationEngine ─┬─► measurements_1m  (mean|min|max|count)
//!               │                      └─► measurements_5m  (mean|min|max|count)
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::measurement::{Field, STAT_TAG, StatType};
use crate::point::{Point, Tags};
use crate::query::Query;
use crate::resolution::Width;
use crate::store::PointStore;
use crate::task::AggregationTask;
use crate::time::{TimeRange, align_down};

/// Samples of one series instance inside one window.
#[derive(Debug)]
pub struct AggregationWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
    /// Samples per field.
    pub data: BTreeMap<Field, Vec<f64>>,
}

impl AggregationWindow {
    /// Creates an empty window.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            data: BTreeMap::new(),
        }
    }

    /// Adds a sample; NaN and infinite samples are dropped.
    pub fn add_sample(&mut self, field: Field, value: f64) {
        if value.is_finite() {
            self.data.entry(field).or_default().push(value);
        }
    }

    /// Returns true if the window holds any sample.
    pub fn has_data(&self) -> bool {
        self.data.values().any(|values| !values.is_empty())
    }

    /// Applies a statistic to one field's samples.
    pub fn summarize(&self, field: Field, stat: StatType) -> Option<f64> {
        stat.apply(self.data.get(&field)?)
    }
}

/// Outcome of one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Raw rows read.
    pub samples: usize,
    /// Non-empty windows found.
    pub windows: usize,
    /// Derived rows that changed the store.
    pub rows_written: usize,
}

impl RunSummary {
    fn absorb(&mut self, other: Self) {
        self.samples += other.samples;
        self.windows += other.windows;
        self.rows_written += other.rows_written;
    }
}

/// Computes and writes aggregate windows for one store.
#[derive(Debug)]
pub struct AggregationEngine<'a, S: PointStore + ?Sized> {
    store: &'a S,
    raw_series: String,
}

impl<'a, S: PointStore + ?Sized> AggregationEngine<'a, S> {
    /// Creates an engine reading `raw_series` from `store`.
    pub fn new(store: &'a S, raw_series: impl Into<String>) -> Self {
        Self {
            store,
            raw_series: raw_series.into(),
        }
    }

    /// Executes one scheduled invocation of `task`.
    ///
    /// `scheduled_at` is the slot boundary the run belongs to; the task's
    /// lookback is measured back from it. `now` bounds which windows count as
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns the store error if reading or writing fails.
    pub fn run_task(
        &self,
        task: &AggregationTask,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let range = task.lookback_range(scheduled_at);
        let summary = self.aggregate_range(task.width, &[task.stat], range, now)?;
        tracing::debug!(
            task = %task.name,
            range = %range,
            samples = summary.samples,
            windows = summary.windows,
            written = summary.rows_written,
            "aggregation run complete"
        );
        Ok(summary)
    }

    /// Executes `task` for several slots in order, stopping at the first
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the store error of the first failing slot.
    pub fn run_slots(
        &self,
        task: &AggregationTask,
        slots: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let mut total = RunSummary::default();
        for &slot in slots {
            total.absorb(self.run_task(task, slot, now)?);
        }
        Ok(total)
    }

    /// Aggregates every closed window of `width` inside `range` for each of
    /// `stats`.
    ///
    /// # Errors
    ///
    /// Returns the store error if reading or writing fails.
    pub fn aggregate_range(
        &self,
        width: Width,
        stats: &[StatType],
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let window_len = width.duration();
        let mut range = range.aligned_within(window_len);
        let closed_until = align_down(now, window_len);
        if range.stop > closed_until {
            range.stop = closed_until;
        }
        if range.is_empty() || stats.is_empty() {
            return Ok(RunSummary::default());
        }

        let query = Field::ALL
            .into_iter()
            .fold(Query::new(self.raw_series.as_str(), range), |q, field| {
                q.field(field.name())
            });
        let rows = self.store.query(&query)?;

        let windows = bucket(&rows, width);
        let points = derive_points(&windows, stats, &width.series_name(&self.raw_series));
        let rows_written = self.store.write_points(&points)?;

        Ok(RunSummary {
            samples: rows.len(),
            windows: windows.len(),
            rows_written,
        })
    }
}

/// Groups raw rows into aligned windows per series instance.
fn bucket(
    rows: &[crate::point::Row],
    width: Width,
) -> BTreeMap<(Tags, DateTime<Utc>), AggregationWindow> {
    let window_len = width.duration();
    let mut windows: BTreeMap<(Tags, DateTime<Utc>), AggregationWindow> = BTreeMap::new();

    for row in rows {
        let start = align_down(row.time, window_len);
        let window = windows
            .entry((row.tags.clone(), start))
            .or_insert_with(|| AggregationWindow::new(start, start + window_len));
        for field in Field::ALL {
            if let Some(value) = row.field(field.name()) {
                window.add_sample(field, value);
            }
        }
    }

    windows.retain(|_, window| window.has_data());
    windows
}

/// Builds one derived point per window and statistic.
fn derive_points(
    windows: &BTreeMap<(Tags, DateTime<Utc>), AggregationWindow>,
    stats: &[StatType],
    series: &str,
) -> Vec<Point> {
    let mut points = Vec::with_capacity(windows.len() * stats.len());
    for ((tags, start), window) in windows {
        for &stat in stats {
            let mut point = Point::new(series, *start);
            point.tags = tags.clone();
            point.tags.insert(STAT_TAG.to_string(), stat.name().to_string());
            for field in Field::ALL {
                if let Some(value) = window.summarize(field, stat) {
                    point.fields.insert(field.name().to_string(), value);
                }
            }
            if !point.fields.is_empty() {
                points.push(point);
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{Measurement, SENSOR_TAG};
    use crate::store::Store;
    use chrono::TimeDelta;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn write(store: &Store, sensor: &str, time: &str, temperature: f64, conductivity: f64) {
        let measurement = Measurement {
            sensor_id: sensor.to_string(),
            timestamp: at(time),
            temperature,
            conductivity,
        };
        store
            .write_points(&[measurement.to_point("measurements")])
            .unwrap();
    }

    fn derived(store: &Store, series: &str, stat: StatType) -> Vec<crate::point::Row> {
        let range = TimeRange::new(at("2000-01-01T00:00:00Z"), at("2100-01-01T00:00:00Z"));
        store
            .query(&Query::new(series, range).tag(STAT_TAG, stat.name()))
            .unwrap()
    }

    #[test]
    fn test_aggregation_window() {
        let mut window = AggregationWindow::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T00:01:00Z"));
        assert!(!window.has_data());

        window.add_sample(Field::Temperature, 10.0);
        window.add_sample(Field::Temperature, 20.0);
        window.add_sample(Field::Temperature, f64::NAN);
        window.add_sample(Field::Temperature, f64::INFINITY);
        window.add_sample(Field::Conductivity, 30.0);
        assert!(window.has_data());

        assert_eq!(window.summarize(Field::Temperature, StatType::Mean), Some(15.0));
        assert_eq!(window.summarize(Field::Temperature, StatType::Count), Some(2.0));
        assert_eq!(window.summarize(Field::Conductivity, StatType::Max), Some(30.0));
    }

    #[test]
    fn test_window_of_only_non_finite_samples_is_empty() {
        let mut window = AggregationWindow::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T00:01:00Z"));
        window.add_sample(Field::Temperature, f64::INFINITY);
        window.add_sample(Field::Conductivity, f64::NEG_INFINITY);
        window.add_sample(Field::Conductivity, f64::NAN);
        assert!(!window.has_data());
        assert_eq!(window.summarize(Field::Temperature, StatType::Count), None);
    }

    #[test]
    fn test_one_minute_mean_and_count() {
        let store = Store::in_memory("measurements");
        write(&store, "s1", "2024-01-01T00:00:05Z", 20.0, 1000.0);
        write(&store, "s1", "2024-01-01T00:00:35Z", 22.0, 1100.0);
        write(&store, "s1", "2024-01-01T00:01:10Z", 25.0, 1200.0);

        let engine = AggregationEngine::new(&store, "measurements");
        let range = TimeRange::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T00:01:00Z"));
        let now = at("2024-01-01T00:05:00Z");
        engine
            .aggregate_range(Width::OneMinute, &[StatType::Mean, StatType::Count], range, now)
            .unwrap();

        let means = derived(&store, "measurements_1m", StatType::Mean);
        assert_eq!(means.len(), 1);
        assert_eq!(means[0].time, at("2024-01-01T00:00:00Z"));
        assert_eq!(means[0].field("temperature"), Some(21.0));
        assert_eq!(means[0].field("conductivity"), Some(1050.0));
        assert_eq!(means[0].tag(SENSOR_TAG), Some("s1"));

        let counts = derived(&store, "measurements_1m", StatType::Count);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].field("temperature"), Some(2.0));
    }

    #[test]
    fn test_empty_window_produces_no_row() {
        let store = Store::in_memory("measurements");
        write(&store, "s1", "2024-01-01T00:00:05Z", 20.0, 1000.0);
        write(&store, "s1", "2024-01-01T00:02:05Z", 21.0, 1000.0);

        let engine = AggregationEngine::new(&store, "measurements");
        let range = TimeRange::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T00:03:00Z"));
        let summary = engine
            .aggregate_range(Width::OneMinute, &[StatType::Mean], range, at("2024-01-01T01:00:00Z"))
            .unwrap();
        assert_eq!(summary.windows, 2);

        let means = derived(&store, "measurements_1m", StatType::Mean);
        let starts: Vec<_> = means.iter().map(|r| r.time).collect();
        assert_eq!(
            starts,
            vec![at("2024-01-01T00:00:00Z"), at("2024-01-01T00:02:00Z")]
        );
    }

    #[test]
    fn test_open_window_is_not_emitted() {
        let store = Store::in_memory("measurements");
        write(&store, "s1", "2024-01-01T00:00:05Z", 20.0, 1000.0);

        let engine = AggregationEngine::new(&store, "measurements");
        let range = TimeRange::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T00:01:00Z"));
        let summary = engine
            .aggregate_range(Width::OneMinute, &[StatType::Mean], range, at("2024-01-01T00:00:50Z"))
            .unwrap();
        assert_eq!(summary, RunSummary::default());
        assert!(derived(&store, "measurements_1m", StatType::Mean).is_empty());
    }

    #[test]
    fn test_partial_windows_at_range_edges_are_skipped() {
        let store = Store::in_memory("measurements");
        write(&store, "s1", "2024-01-01T00:00:05Z", 20.0, 1000.0);
        write(&store, "s1", "2024-01-01T00:01:05Z", 30.0, 1000.0);

        let engine = AggregationEngine::new(&store, "measurements");
        let range = TimeRange::new(at("2024-01-01T00:00:30Z"), at("2024-01-01T00:02:00Z"));
        engine
            .aggregate_range(Width::OneMinute, &[StatType::Mean], range, at("2024-01-01T01:00:00Z"))
            .unwrap();

        let means = derived(&store, "measurements_1m", StatType::Mean);
        assert_eq!(means.len(), 1);
        assert_eq!(means[0].time, at("2024-01-01T00:01:00Z"));
        assert_eq!(means[0].field("temperature"), Some(30.0));
    }

    #[test]
    fn test_sensors_are_aggregated_separately() {
        let store = Store::in_memory("measurements");
        write(&store, "s1", "2024-01-01T00:00:05Z", 20.0, 1000.0);
        write(&store, "s2", "2024-01-01T00:00:10Z", 30.0, 2000.0);

        let engine = AggregationEngine::new(&store, "measurements");
        let range = TimeRange::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T00:05:00Z"));
        engine
            .aggregate_range(Width::FiveMinutes, &[StatType::Max], range, at("2024-01-01T02:00:00Z"))
            .unwrap();

        let maxes = derived(&store, "measurements_5m", StatType::Max);
        assert_eq!(maxes.len(), 2);
        let by_sensor: BTreeMap<_, _> = maxes
            .iter()
            .map(|r| (r.tag(SENSOR_TAG).unwrap().to_string(), r.field("temperature").unwrap()))
            .collect();
        assert_eq!(by_sensor["s1"], 20.0);
        assert_eq!(by_sensor["s2"], 30.0);
    }

    #[test]
    fn test_rerun_is_noop() {
        let store = Store::in_memory("measurements");
        write(&store, "s1", "2024-01-01T00:00:05Z", 20.0, 1000.0);
        write(&store, "s1", "2024-01-01T00:00:35Z", 22.0, 1100.0);

        let engine = AggregationEngine::new(&store, "measurements");
        let range = TimeRange::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T00:01:00Z"));
        let now = at("2024-01-01T00:05:00Z");
        let stats = StatType::ALL;

        let first = engine.aggregate_range(Width::OneMinute, &stats, range, now).unwrap();
        assert_eq!(first.rows_written, 4);
        let rows_after_first = store.row_count().unwrap();

        let second = engine.aggregate_range(Width::OneMinute, &stats, range, now).unwrap();
        assert_eq!(second.rows_written, 0);
        assert_eq!(second.windows, 1);
        assert_eq!(store.row_count().unwrap(), rows_after_first);
    }

    #[test]
    fn test_run_task_uses_lookback() {
        let store = Store::in_memory("measurements");
        // Slot at 00:10 reprocesses [00:08, 00:09).
        write(&store, "s1", "2024-01-01T00:08:15Z", 20.0, 1000.0);
        write(&store, "s1", "2024-01-01T00:09:15Z", 99.0, 1000.0);

        let task = AggregationTask::new(Width::OneMinute, StatType::Mean, at("2024-01-01T00:00:00Z"));
        let engine = AggregationEngine::new(&store, "measurements");
        let slot = at("2024-01-01T00:10:00Z");
        let summary = engine
            .run_task(&task, slot, slot + TimeDelta::seconds(10))
            .unwrap();
        assert_eq!(summary.samples, 1);

        let means = derived(&store, "measurements_1m", StatType::Mean);
        assert_eq!(means.len(), 1);
        assert_eq!(means[0].time, at("2024-01-01T00:08:00Z"));
    }

    #[test]
    fn test_consecutive_slots_tile_time() {
        let store = Store::in_memory("measurements");
        for minute in 0..10 {
            write(
                &store,
                "s1",
                &format!("2024-01-01T00:{minute:02}:30Z"),
                f64::from(minute),
                1000.0,
            );
        }

        let task = AggregationTask::new(Width::OneMinute, StatType::Count, at("2024-01-01T00:00:00Z"));
        let engine = AggregationEngine::new(&store, "measurements");
        let slots: Vec<_> = (2..12)
            .map(|m| at("2024-01-01T00:00:00Z") + TimeDelta::minutes(m))
            .collect();
        let summary = engine
            .run_slots(&task, &slots, at("2024-01-01T01:00:00Z"))
            .unwrap();
        assert_eq!(summary.windows, 10);
        assert_eq!(summary.samples, 10);

        let counts = derived(&store, "measurements_1m", StatType::Count);
        assert_eq!(counts.len(), 10);
        assert!(counts.iter().all(|r| r.field("temperature") == Some(1.0)));
    }
}
