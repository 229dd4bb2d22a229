//! Store-level data model: points written to and rows read from a series.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered tag set identifying one series instance within a series name.
pub type Tags = BTreeMap<String, String>;

/// Ordered field values carried by a point.
pub type Fields = BTreeMap<String, f64>;

/// A single write to the store.
///
/// Points sharing `series`, `tags` and `time` overwrite each other field by
/// field; fields absent from a later write keep their earlier value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Series (measurement) name.
    pub series: String,
    /// Identifying tags.
    #[serde(default)]
    pub tags: Tags,
    /// Sample instant.
    pub time: DateTime<Utc>,
    /// Field values.
    pub fields: Fields,
}

impl Point {
    /// Creates a point with no tags or fields.
    pub fn new(series: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            series: series.into(),
            tags: Tags::new(),
            time,
            fields: Fields::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds a field value.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// A row returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Series the row was read from.
    pub series: String,
    /// Tags of the series instance.
    pub tags: Tags,
    /// Row instant.
    pub time: DateTime<Utc>,
    /// Field values that passed the query's field filter.
    pub fields: Fields,
}

impl Row {
    /// Returns a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns a field value.
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}
