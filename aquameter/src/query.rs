//! Typed query description for reading rows from the store.
//!
//! A [`Query`] names a series, a half-open time range, exact-match tag filters
//! and an optional field projection. Every part is a structured value: there
//! is no query text, so caller-supplied identifiers such as a sensor id can
//! only ever be compared for equality.
//!
//! # Example Usage
//!
//! ```rust
//! use aquameter::query::{Order, Query};
//! use aquameter::time::TimeRange;
//! # use chrono::{DateTime, Utc};
//! # let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
//! # let stop = DateTime::<Utc>::from_timestamp(3600, 0).unwrap();
//!
//! let query = Query::new("measurements", TimeRange::new(start, stop))
//!     .tag("sensor_id", "sensor_001")
//!     .field("temperature")
//!     .order(Order::Descending)
//!     .limit(100);
//! assert_eq!(query.limit, Some(100));
//! ```

use crate::point::{Row, Tags};
use crate::time::TimeRange;

/// Row ordering by time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// A structured read request against one series.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Series name to read.
    pub series: String,
    /// Time range; rows outside `[start, stop)` are excluded.
    pub range: TimeRange,
    /// Tags a series instance must carry with exactly these values.
    pub tags: Tags,
    /// Fields to return; empty means all fields.
    pub fields: Vec<String>,
    /// Row order.
    pub order: Order,
    /// Maximum number of rows, applied after ordering.
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a query for every row of `series` inside `range`.
    pub fn new(series: impl Into<String>, range: TimeRange) -> Self {
        Self {
            series: series.into(),
            range,
            tags: Tags::new(),
            fields: Vec::new(),
            order: Order::Ascending,
            limit: None,
        }
    }

    /// Requires a tag to equal `value`.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds a field to the projection.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    /// Sets the row order.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Caps the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if a series instance with `tags` satisfies the tag filters.
    pub fn matches_tags(&self, tags: &Tags) -> bool {
        self.tags
            .iter()
            .all(|(key, value)| tags.get(key).is_some_and(|v| v == value))
    }

    /// Returns true if `name` passes the field projection.
    pub fn selects_field(&self, name: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == name)
    }

    /// Sorts rows into the query's order and applies the limit.
    pub(crate) fn finish(&self, mut rows: Vec<Row>) -> Vec<Row> {
        rows.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.tags.cmp(&b.tags)));
        if self.order == Order::Descending {
            rows.reverse();
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}
