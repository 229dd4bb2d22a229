//! Time specifications, half-open ranges, and epoch alignment.
//!
//! Read requests describe their range with specifications such as `-7d` or
//! `2024-01-01T00:00:00Z`. A [`TimeSpec`] is resolved against a caller-supplied
//! "now" so that range computation stays deterministic under test.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::TimeSpecError;

/// A point in time given either relative to now or as an absolute instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpec {
    /// Offset from the resolution instant (negative values lie in the past).
    Relative(TimeDelta),
    /// A fixed UTC instant.
    Absolute(DateTime<Utc>),
}

impl TimeSpec {
    /// Resolves this specification against `now`.
    ///
    /// Returns `None` if a relative offset leaves the representable range.
    pub fn resolve(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Relative(offset) => now.checked_add_signed(offset),
            Self::Absolute(instant) => Some(instant),
        }
    }
}

impl FromStr for TimeSpec {
    type Err = TimeSpecError;

    /// Parses `[+-]<integer><unit>` with unit `s`, `m`, `h`, `d`, or `w`, or
    /// an RFC 3339 instant.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(TimeSpecError::Empty);
        }

        if let Some((negative, magnitude, unit)) = split_relative(spec) {
            let magnitude = i64::try_from(magnitude).map_err(|_| TimeSpecError::OutOfRange {
                spec: spec.to_string(),
            })?;
            let magnitude = if negative { -magnitude } else { magnitude };
            let offset = match unit {
                's' => TimeDelta::try_seconds(magnitude),
                'm' => TimeDelta::try_minutes(magnitude),
                'h' => TimeDelta::try_hours(magnitude),
                'd' => TimeDelta::try_days(magnitude),
                'w' => TimeDelta::try_weeks(magnitude),
                _ => {
                    return Err(TimeSpecError::Unrecognized {
                        spec: spec.to_string(),
                    });
                }
            }
            .ok_or_else(|| TimeSpecError::OutOfRange {
                spec: spec.to_string(),
            })?;
            return Ok(Self::Relative(offset));
        }

        DateTime::parse_from_rfc3339(spec)
            .map(|instant| Self::Absolute(instant.with_timezone(&Utc)))
            .map_err(|_| TimeSpecError::Unrecognized {
                spec: spec.to_string(),
            })
    }
}

/// Splits a signed relative specification into `(negative, magnitude, unit)`.
///
/// Returns `None` unless the input is a sign, at least one ASCII digit, and a
/// single trailing unit character.
pub(crate) fn split_relative(spec: &str) -> Option<(bool, u64, char)> {
    let (negative, body) = if let Some(rest) = spec.strip_prefix('-') {
        (true, rest)
    } else {
        (false, spec.strip_prefix('+')?)
    };

    let unit = body.chars().last()?;
    let digits = &body[..body.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let magnitude = digits.parse::<u64>().ok()?;
    Some((negative, magnitude, unit))
}

fn resolve_param(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeSpecError> {
    raw.parse::<TimeSpec>()?
        .resolve(now)
        .ok_or_else(|| TimeSpecError::OutOfRange {
            spec: raw.trim().to_string(),
        })
}

/// A half-open time interval `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub stop: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range from its bounds.
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        Self { start, stop }
    }

    /// Builds a range from optional request parameters.
    ///
    /// `start` falls back to `default_start`; a missing `end` means `now`.
    ///
    /// # Errors
    ///
    /// Returns the parse or resolution failure of whichever parameter is
    /// malformed, tagged with the parameter name.
    pub fn from_params(
        start: Option<&str>,
        end: Option<&str>,
        default_start: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, (&'static str, TimeSpecError)> {
        let start = resolve_param(start.unwrap_or(default_start), now).map_err(|e| ("start", e))?;
        let stop = match end {
            Some(end) => resolve_param(end, now).map_err(|e| ("end", e))?,
            None => now,
        };
        Ok(Self { start, stop })
    }

    /// Returns true if the instant lies inside the range.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.stop
    }

    /// Returns true if no instant lies inside the range.
    pub fn is_empty(&self) -> bool {
        self.start >= self.stop
    }

    /// Shrinks the range to the largest sub-range whose bounds are multiples
    /// of `width` since the epoch.
    pub fn aligned_within(&self, width: TimeDelta) -> Self {
        let start = align_down(self.start, width);
        let start = if start < self.start {
            start.checked_add_signed(width).unwrap_or(self.stop)
        } else {
            start
        };
        let stop = align_down(self.stop, width);
        Self { start, stop }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.stop.to_rfc3339())
    }
}

/// Floors `instant` to the nearest multiple of `width` since the epoch.
///
/// Widths below one microsecond are treated as one microsecond.
pub fn align_down(instant: DateTime<Utc>, width: TimeDelta) -> DateTime<Utc> {
    let step = width.num_microseconds().unwrap_or(i64::MAX).max(1);
    let micros = instant.timestamp_micros();
    let floored = micros.div_euclid(step) * step;
    DateTime::from_timestamp_micros(floored).unwrap_or(instant)
}
