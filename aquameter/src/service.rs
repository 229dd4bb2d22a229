//! Query service: raw and aggregated read views over the store.
//!
//! Every operation takes the instant it treats as "now" so that relative time
//! specifications resolve deterministically.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::measurement::{Field, Measurement, SENSOR_TAG, STAT_TAG, StatType};
use crate::point::Row;
use crate::query::{Order, Query};
use crate::resolution::{Resolution, select_window};
use crate::store::PointStore;
use crate::time::TimeRange;

/// Start used when a read request names none.
pub const DEFAULT_START: &str = "-7d";

/// Row limit for raw reads when the request names none.
pub const DEFAULT_LIMIT: usize = 100;

/// Days back a sensor must have reported to be listed.
pub const SENSOR_LOOKBACK_DAYS: i64 = 30;

/// Parses the `limit` request parameter.
///
/// # Errors
///
/// Returns [`QueryError::InvalidLimit`] unless the value is a non-negative
/// integer.
pub fn parse_limit(raw: Option<&str>) -> std::result::Result<usize, QueryError> {
    match raw {
        None => Ok(DEFAULT_LIMIT),
        Some(value) => value.trim().parse().map_err(|_| QueryError::InvalidLimit {
            value: value.to_string(),
        }),
    }
}

/// Mean values of one window, both fields side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPoint {
    /// Window start.
    pub timestamp: DateTime<Utc>,
    /// Sensor the window belongs to.
    pub sensor_id: String,
    /// Mean temperature, if the window had temperature samples.
    pub temperature: Option<f64>,
    /// Mean conductivity, if the window had conductivity samples.
    pub conductivity: Option<f64>,
    /// Resolution label.
    pub window: String,
}

/// All statistics of one field in one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FieldStats {
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Minimum.
    pub min: Option<f64>,
    /// Maximum.
    pub max: Option<f64>,
    /// Contributing samples.
    pub count: Option<u64>,
}

impl FieldStats {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn set(&mut self, stat: StatType, value: f64) {
        match stat {
            StatType::Mean => self.mean = Some(value),
            StatType::Min => self.min = Some(value),
            StatType::Max => self.max = Some(value),
            StatType::Count => self.count = Some(value.round().max(0.0) as u64),
        }
    }
}

/// Every statistic of one window, grouped per field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsRecord {
    /// Window start.
    pub timestamp: DateTime<Utc>,
    /// Sensor the window belongs to.
    pub sensor_id: String,
    /// Resolution label.
    pub window: String,
    /// Temperature statistics.
    pub temperature: FieldStats,
    /// Conductivity statistics.
    pub conductivity: FieldStats,
}

impl StatisticsRecord {
    fn field_mut(&mut self, field: Field) -> &mut FieldStats {
        match field {
            Field::Temperature => &mut self.temperature,
            Field::Conductivity => &mut self.conductivity,
        }
    }
}

/// Records read at one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Windowed<T> {
    /// Resolution the records were read from.
    pub window: Resolution,
    /// Records, newest first.
    pub records: Vec<T>,
}

/// Read operations behind the HTTP query endpoints and the CLI.
#[derive(Debug)]
pub struct QueryService<S: PointStore + ?Sized> {
    store: Arc<S>,
    raw_series: String,
}

impl<S: PointStore + ?Sized> Clone for QueryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            raw_series: self.raw_series.clone(),
        }
    }
}

impl<S: PointStore + ?Sized> QueryService<S> {
    /// Creates a service reading `raw_series` and its derived series.
    pub fn new(store: Arc<S>, raw_series: impl Into<String>) -> Self {
        Self {
            store,
            raw_series: raw_series.into(),
        }
    }

    /// Returns raw measurements of one sensor, newest first.
    ///
    /// `start` defaults to [`DEFAULT_START`] and `end` to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidTime`] for a malformed `start` or `end`
    /// and the store error if the read fails.
    pub fn get_raw(
        &self,
        sensor_id: &str,
        start: Option<&str>,
        end: Option<&str>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Measurement>> {
        let range = request_range(start, end, now)?;
        let query = Query::new(self.raw_series.as_str(), range)
            .tag(SENSOR_TAG, sensor_id)
            .order(Order::Descending)
            .limit(limit);

        let rows = self.store.query(&query)?;
        tracing::debug!(sensor_id, range = %range, rows = rows.len(), "raw query");
        Ok(rows.iter().filter_map(Measurement::from_row).collect())
    }

    /// Returns per-window means of one sensor at the selected resolution,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidTime`] for a malformed `start` or `end`
    /// and the store error if the read fails.
    pub fn get_aggregated(
        &self,
        sensor_id: &str,
        start: Option<&str>,
        end: Option<&str>,
        window: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Windowed<AggregatedPoint>> {
        let (resolution, rows) =
            self.read_windows(sensor_id, start, end, window, Some(StatType::Mean), now)?;
        let label = resolution.label().to_string();

        let records = rows
            .iter()
            .map(|row| AggregatedPoint {
                timestamp: row.time,
                sensor_id: row.tag(SENSOR_TAG).unwrap_or(sensor_id).to_string(),
                temperature: row.field(Field::Temperature.name()),
                conductivity: row.field(Field::Conductivity.name()),
                window: label.clone(),
            })
            .collect();

        Ok(Windowed {
            window: resolution,
            records,
        })
    }

    /// Returns every statistic of one sensor at the selected resolution,
    /// merged into one record per window, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidTime`] for a malformed `start` or `end`
    /// and the store error if the read fails.
    pub fn get_statistics(
        &self,
        sensor_id: &str,
        start: Option<&str>,
        end: Option<&str>,
        window: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Windowed<StatisticsRecord>> {
        let (resolution, rows) = self.read_windows(sensor_id, start, end, window, None, now)?;
        let label = resolution.label();

        let mut grouped: BTreeMap<(DateTime<Utc>, String), StatisticsRecord> = BTreeMap::new();
        for row in &rows {
            let Some(stat) = row.tag(STAT_TAG).and_then(StatType::from_name) else {
                continue;
            };
            let sensor = row.tag(SENSOR_TAG).unwrap_or(sensor_id).to_string();
            let record = grouped
                .entry((row.time, sensor.clone()))
                .or_insert_with(|| StatisticsRecord {
                    timestamp: row.time,
                    sensor_id: sensor,
                    window: label.to_string(),
                    temperature: FieldStats::default(),
                    conductivity: FieldStats::default(),
                });
            for field in Field::ALL {
                if let Some(value) = row.field(field.name()) {
                    record.field_mut(field).set(stat, value);
                }
            }
        }

        Ok(Windowed {
            window: resolution,
            records: grouped.into_values().rev().collect(),
        })
    }

    /// Returns the sensors that reported within the last
    /// [`SENSOR_LOOKBACK_DAYS`] days, sorted.
    ///
    /// # Errors
    ///
    /// Returns the store error if the read fails.
    pub fn list_sensors(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let range = TimeRange::new(now - TimeDelta::days(SENSOR_LOOKBACK_DAYS), now);
        let sensors = self.store.tag_values(&self.raw_series, SENSOR_TAG, range)?;
        Ok(sensors.into_iter().collect())
    }

    fn read_windows(
        &self,
        sensor_id: &str,
        start: Option<&str>,
        end: Option<&str>,
        window: Option<&str>,
        stat: Option<StatType>,
        now: DateTime<Utc>,
    ) -> Result<(Resolution, Vec<Row>)> {
        let resolution = select_window(start.unwrap_or(DEFAULT_START), window);
        let range = request_range(start, end, now)?;

        let mut query = Query::new(resolution.series_name(&self.raw_series), range)
            .tag(SENSOR_TAG, sensor_id)
            .order(Order::Descending);
        if let Some(stat) = stat {
            query = query.tag(STAT_TAG, stat.name());
        }

        let rows = self.store.query(&query)?;
        tracing::debug!(
            sensor_id,
            window = %resolution,
            range = %range,
            rows = rows.len(),
            "aggregated query"
        );
        Ok((resolution, rows))
    }
}

fn request_range(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> Result<TimeRange> {
    TimeRange::from_params(start, end, DEFAULT_START, now)
        .map_err(|(param, source)| QueryError::InvalidTime { param, source }.into())
}
