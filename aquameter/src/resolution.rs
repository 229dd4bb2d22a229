//! Aggregation widths and the resolution selection policy.
//!
//! Two fixed widths exist: one minute and five minutes. Each width carries its
//! own run schedule and lookback lag, which together guarantee that a window
//! is only aggregated once no more raw samples can arrive for it:
//!
//! | width | every | offset | lookback          |
//! |-------|-------|--------|-------------------|
//! | 1m    | 1m    | 10s    | `[T-2m, T-1m)`    |
//! | 5m    | 5m    | 30s    | `[T-70m, T-65m)`  |
//!
//! Queries pick a resolution with [`select_window`]: recent, short ranges are
//! answered at one-minute granularity; everything else at five minutes.

use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::time::split_relative;

/// Resolution used when no rule selects a finer one.
const COARSE: Width = Width::FiveMinutes;

/// A fixed aggregation window width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Width {
    /// One-minute windows.
    #[serde(rename = "1m")]
    OneMinute,
    /// Five-minute windows.
    #[serde(rename = "5m")]
    FiveMinutes,
}

impl Width {
    /// Every supported width, finest first.
    pub const ALL: [Width; 2] = [Width::OneMinute, Width::FiveMinutes];

    /// Short label used in series names and API responses.
    pub fn label(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
        }
    }

    /// Parses a label produced by [`Width::label`].
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|width| width.label() == label)
    }

    /// Length of one window.
    pub fn duration(self) -> TimeDelta {
        match self {
            Self::OneMinute => TimeDelta::minutes(1),
            Self::FiveMinutes => TimeDelta::minutes(5),
        }
    }

    /// Interval between scheduled runs of tasks at this width.
    pub fn every(self) -> TimeDelta {
        self.duration()
    }

    /// Delay after each slot boundary before the run fires.
    pub fn offset(self) -> TimeDelta {
        match self {
            Self::OneMinute => TimeDelta::seconds(10),
            Self::FiveMinutes => TimeDelta::seconds(30),
        }
    }

    /// How far before the scheduled time the reprocessed range starts and
    /// stops.
    pub fn lookback(self) -> Lookback {
        match self {
            Self::OneMinute => Lookback {
                start: TimeDelta::minutes(2),
                stop: TimeDelta::minutes(1),
            },
            Self::FiveMinutes => Lookback {
                start: TimeDelta::minutes(70),
                stop: TimeDelta::minutes(65),
            },
        }
    }

    /// Name of the derived series holding aggregates at this width.
    pub fn series_name(self, raw_series: &str) -> String {
        format!("{raw_series}_{}", self.label())
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Relative bounds of the range an aggregation run reprocesses.
///
/// Both values are distances before the scheduled time; `start` is the larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookback {
    /// Distance before the scheduled time at which the range starts.
    #[serde(with = "crate::task::seconds_serde")]
    pub start: TimeDelta,
    /// Distance before the scheduled time at which the range stops.
    #[serde(with = "crate::task::seconds_serde")]
    pub stop: TimeDelta,
}

/// The resolution chosen to answer an aggregated query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// One of the widths the aggregation engine maintains.
    Known(Width),
    /// An explicit override naming no maintained width; queries against it
    /// return no rows.
    Unrecognized(String),
}

impl Resolution {
    /// Interprets an explicit `window` override.
    pub fn parse(label: &str) -> Self {
        Width::from_label(label).map_or_else(|| Self::Unrecognized(label.to_string()), Self::Known)
    }

    /// The label echoed back in responses.
    pub fn label(&self) -> &str {
        match self {
            Self::Known(width) => width.label(),
            Self::Unrecognized(label) => label,
        }
    }

    /// Name of the series that would hold rows at this resolution.
    pub fn series_name(&self, raw_series: &str) -> String {
        format!("{raw_series}_{}", self.label())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Chooses the resolution for a query starting at `start_spec`.
///
/// A non-empty `explicit` override wins outright and is not validated. Without
/// one, relative starts pick one-minute windows when they reach back at most
/// 60 minutes (or 1 hour); days, other units, and absolute instants pick
/// five-minute windows.
///
/// # Examples
///
/// ```rust
/// use aquameter::resolution::{select_window, Resolution, Width};
///
/// assert_eq!(select_window("-30m", None), Resolution::Known(Width::OneMinute));
/// assert_eq!(select_window("-3h", None), Resolution::Known(Width::FiveMinutes));
/// assert_eq!(select_window("-3h", Some("1m")), Resolution::Known(Width::OneMinute));
/// ```
pub fn select_window(start_spec: &str, explicit: Option<&str>) -> Resolution {
    if let Some(label) = explicit.filter(|label| !label.is_empty()) {
        return Resolution::parse(label);
    }

    let width = match split_relative(start_spec.trim()) {
        Some((_, minutes, 'm')) if minutes <= 60 => Width::OneMinute,
        Some((_, hours, 'h')) if hours <= 1 => Width::OneMinute,
        _ => COARSE,
    };
    Resolution::Known(width)
}
