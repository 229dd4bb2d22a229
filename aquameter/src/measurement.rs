//! Sensor measurements and the statistics derived from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::point::{Point, Row};

/// Tag carrying the sensor identity on raw and derived rows.
pub const SENSOR_TAG: &str = "sensor_id";

/// Tag carrying the statistic on derived rows.
pub const STAT_TAG: &str = "stat_type";

/// One reading from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Opaque sensor identifier.
    pub sensor_id: String,
    /// Instant the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Water temperature in °C.
    pub temperature: f64,
    /// Electrical conductivity in µS/cm.
    pub conductivity: f64,
}

impl Measurement {
    /// Converts the measurement into a point of `raw_series`.
    pub fn to_point(&self, raw_series: &str) -> Point {
        Point::new(raw_series, self.timestamp)
            .tag(SENSOR_TAG, self.sensor_id.clone())
            .field(Field::Temperature.name(), self.temperature)
            .field(Field::Conductivity.name(), self.conductivity)
    }

    /// Rebuilds a measurement from a raw row, if it carries a sensor tag and
    /// both fields.
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            sensor_id: row.tag(SENSOR_TAG)?.to_string(),
            timestamp: row.time,
            temperature: row.field(Field::Temperature.name())?,
            conductivity: row.field(Field::Conductivity.name())?,
        })
    }
}

/// A numeric field of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Temperature in °C.
    Temperature,
    /// Conductivity in µS/cm.
    Conductivity,
}

impl Field {
    /// Every field the aggregation engine summarizes.
    pub const ALL: [Field; 2] = [Field::Temperature, Field::Conductivity];

    /// Field name in the store.
    pub fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Conductivity => "conductivity",
        }
    }

    /// Looks up a field by its store name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Statistic computed over the samples of one window.
///
/// Non-finite samples are ignored. A window without finite samples has no
/// statistic at all; callers must not emit a row for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatType {
    /// Arithmetic mean.
    Mean,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Number of contributing samples.
    Count,
}

impl StatType {
    /// Every statistic, in the order tasks are provisioned.
    pub const ALL: [StatType; 4] = [StatType::Mean, StatType::Min, StatType::Max, StatType::Count];

    /// Tag value in the store.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
        }
    }

    /// Looks up a statistic by its tag value.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stat| stat.name() == name)
    }

    /// Applies this statistic to a window's samples.
    ///
    /// Returns `None` when no finite sample is present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use aquameter::measurement::StatType;
    ///
    /// let values = [20.0, f64::NAN, 22.0];
    /// assert_eq!(StatType::Mean.apply(&values), Some(21.0));
    /// assert_eq!(StatType::Min.apply(&values), Some(20.0));
    /// assert_eq!(StatType::Max.apply(&values), Some(22.0));
    /// assert_eq!(StatType::Count.apply(&values), Some(2.0));
    /// assert_eq!(StatType::Mean.apply(&[]), None);
    /// ```
    #[allow(clippy::cast_precision_loss)] // sample counts stay far below 2^52
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        let mut finite = values.iter().copied().filter(|v| v.is_finite()).peekable();
        finite.peek()?;

        Some(match self {
            Self::Mean => {
                let (sum, count) = finite.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
                sum / count as f64
            }
            Self::Min => finite.fold(f64::INFINITY, f64::min),
            Self::Max => finite.fold(f64::NEG_INFINITY, f64::max),
            Self::Count => finite.count() as f64,
        })
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
