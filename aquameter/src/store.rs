//! Embedded measurement store.
//!
//! The [`Store`] keeps every series in ordered in-memory maps and, for file
//! stores, mirrors each accepted write into an append-only [`Journal`]. It
//! implements [`PointStore`], the seam the ingestion gateway, the query service
//! and the aggregation engine are written against.
//!
//! # Design
//!
//! - Series are keyed by name, then by tag set, then by time
//! - Writes are last-write-wins per `(series, tags, time, field)`
//! - Writes that would not change stored state are dropped before they reach
//!   the journal, which makes re-running an aggregation a true no-op
//! - Interior locking makes a shared `&Store` safe for concurrent readers and
//!   writers
//!
//! # File Layout
//!
//! ```text
//! <url path>/<org>/<bucket>/
//! ├── meta.json        <- Format version and raw series name
//! ├── points.jsonl     <- Append-only point journal
//! └── tasks.json       <- Aggregation task registry
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{StoreConfig, StoreLocation};
use crate::error::{Result, StoreError};
use crate::journal::{JOURNAL_FILE, Journal};
use crate::point::{Fields, Point, Row, Tags};
use crate::query::Query;
use crate::time::TimeRange;

/// Metadata file format version.
const METADATA_VERSION: u32 = 1;

/// Name of the metadata file in the store directory.
const METADATA_FILE: &str = "meta.json";

/// Read and write access to tagged, timestamped points.
///
/// Implementations must be safe to share across threads; every method takes
/// `&self`.
pub trait PointStore: Send + Sync {
    /// Writes points with last-write-wins semantics per field and returns how
    /// many of them changed stored state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] (wrapped in [`AquaError`](crate::AquaError)) if
    /// the write could not be persisted. On error no point of the batch is
    /// applied.
    fn write_points(&self, points: &[Point]) -> Result<usize>;

    /// Executes a typed query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn query(&self, query: &Query) -> Result<Vec<Row>>;

    /// Returns the distinct values of `tag` across instances of `series` that
    /// hold at least one row inside `range`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn tag_values(&self, series: &str, tag: &str, range: TimeRange) -> Result<BTreeSet<String>>;
}

/// Rows of one series instance, ordered by time.
type Timeline = BTreeMap<DateTime<Utc>, Fields>;

#[derive(Debug, Default)]
struct StoreState {
    /// Series name -> tag set -> time -> fields.
    series: BTreeMap<String, BTreeMap<Tags, Timeline>>,
    points: usize,
}

impl StoreState {
    /// Returns the stored value of one field of the row `point` addresses.
    fn field(&self, point: &Point, name: &str) -> Option<f64> {
        self.series
            .get(&point.series)
            .and_then(|instances| instances.get(&point.tags))
            .and_then(|timeline| timeline.get(&point.time))
            .and_then(|fields| fields.get(name))
            .copied()
    }

    fn apply(&mut self, point: Point) {
        let timeline = self
            .series
            .entry(point.series)
            .or_default()
            .entry(point.tags)
            .or_default();
        let fields = timeline.entry(point.time).or_insert_with(|| {
            self.points += 1;
            Fields::new()
        });
        fields.extend(point.fields);
    }
}

/// Metadata stored in the store's meta.json file.
#[derive(Debug, Serialize, Deserialize)]
struct StoreMetadata {
    /// Metadata format version.
    version: u32,
    /// Raw measurement series this store was created for.
    raw_series: String,
    /// When the store directory was created.
    created_at: DateTime<Utc>,
}

/// Embedded time-series store.
///
/// # Example Usage
///
/// ```rust
/// use aquameter::point::Point;
/// use aquameter::query::Query;
/// use aquameter::store::{PointStore, Store};
/// use aquameter::time::TimeRange;
/// use chrono::{DateTime, Utc};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Store::in_memory("measurements");
/// let t = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
///
/// store.write_points(&[Point::new("measurements", t)
///     .tag("sensor_id", "sensor_001")
///     .field("temperature", 21.5)])?;
///
/// let range = TimeRange::new(t, t + chrono::TimeDelta::seconds(1));
/// let rows = store.query(&Query::new("measurements", range).tag("sensor_id", "sensor_001"))?;
/// assert_eq!(rows[0].field("temperature"), Some(21.5));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Store {
    location: StoreLocation,
    raw_series: String,
    state: RwLock<StoreState>,
    journal: Mutex<Option<Journal>>,
    read_only: bool,
}

impl Store {
    /// Opens the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid URL or name, and any error
    /// of [`Store::open_dir`] for file stores.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        match config.location()? {
            StoreLocation::Memory => Ok(Self::in_memory(&config.raw_series)),
            StoreLocation::Directory(path) => Self::open_dir(path, &config.raw_series),
        }
    }

    /// Opens the store described by `config` for reading only.
    ///
    /// Used by processes that do not own the store, such as the CLI next to a
    /// running server. Nothing on disk is created or modified, and every
    /// write fails with [`StoreError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid URL or name, and any error
    /// of [`Store::open_dir_read_only`] for file stores.
    pub fn open_read_only(config: &StoreConfig) -> Result<Self> {
        match config.location()? {
            StoreLocation::Memory => Ok(Self::in_memory(&config.raw_series)),
            StoreLocation::Directory(path) => Self::open_dir_read_only(path, &config.raw_series),
        }
    }

    /// Creates an empty volatile store.
    pub fn in_memory(raw_series: &str) -> Self {
        Self {
            location: StoreLocation::Memory,
            raw_series: raw_series.to_string(),
            state: RwLock::new(StoreState::default()),
            journal: Mutex::new(None),
            read_only: false,
        }
    }

    /// Creates or opens a file store in `path`.
    ///
    /// If the directory doesn't exist it is created together with meta.json.
    /// If it exists, meta.json is validated against `raw_series` and the
    /// journal is replayed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DirectoryAccess`] if the directory or metadata cannot
    ///   be created or read
    /// - [`StoreError::CorruptedMetadata`] if meta.json is invalid
    /// - [`StoreError::MetadataMismatch`] if the store was created for another
    ///   raw series
    /// - journal errors from [`Journal::open`]
    pub fn open_dir<P: AsRef<Path>>(path: P, raw_series: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        fs::create_dir_all(&path).map_err(|e| StoreError::DirectoryAccess {
            path: path.display().to_string(),
            source: e,
        })?;

        let metadata_path = path.join(METADATA_FILE);
        if metadata_path.exists() {
            Self::validate_metadata(&metadata_path, raw_series)?;
        } else {
            Self::write_metadata(&metadata_path, raw_series)?;
        }

        let (journal, points) = Journal::open(path.join(JOURNAL_FILE))?;
        let mut state = StoreState::default();
        let replayed = points.len();
        for point in points {
            state.apply(point);
        }

        tracing::info!(
            path = %path.display(),
            replayed,
            rows = state.points,
            "store opened"
        );

        Ok(Self {
            location: StoreLocation::Directory(path),
            raw_series: raw_series.to_string(),
            state: RwLock::new(state),
            journal: Mutex::new(Some(journal)),
            read_only: false,
        })
    }

    /// Opens a file store in `path` without touching the directory.
    ///
    /// The journal is replayed with [`Journal::replay`], which leaves an
    /// unterminated tail alone. A directory without meta.json reads as an
    /// empty store.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CorruptedMetadata`] or [`StoreError::MetadataMismatch`]
    ///   if meta.json is invalid or names another raw series
    /// - journal errors from [`Journal::replay`]
    pub fn open_dir_read_only<P: AsRef<Path>>(path: P, raw_series: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let metadata_path = path.join(METADATA_FILE);
        if metadata_path.exists() {
            Self::validate_metadata(&metadata_path, raw_series)?;
        }

        let mut state = StoreState::default();
        for point in Journal::replay(path.join(JOURNAL_FILE))? {
            state.apply(point);
        }
        tracing::debug!(path = %path.display(), rows = state.points, "store opened read-only");

        Ok(Self {
            location: StoreLocation::Directory(path),
            raw_series: raw_series.to_string(),
            state: RwLock::new(state),
            journal: Mutex::new(None),
            read_only: true,
        })
    }

    fn write_metadata(metadata_path: &Path, raw_series: &str) -> Result<()> {
        let metadata = StoreMetadata {
            version: METADATA_VERSION,
            raw_series: raw_series.to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StoreError::Encode { source: e })?;
        fs::write(metadata_path, json).map_err(|e| StoreError::DirectoryAccess {
            path: metadata_path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    fn validate_metadata(metadata_path: &Path, raw_series: &str) -> Result<()> {
        let content =
            fs::read_to_string(metadata_path).map_err(|e| StoreError::DirectoryAccess {
                path: metadata_path.display().to_string(),
                source: e,
            })?;
        let metadata: StoreMetadata =
            serde_json::from_str(&content).map_err(|e| StoreError::CorruptedMetadata {
                reason: e.to_string(),
            })?;

        if metadata.version != METADATA_VERSION {
            return Err(StoreError::CorruptedMetadata {
                reason: format!(
                    "unsupported version {} (expected {METADATA_VERSION})",
                    metadata.version
                ),
            }
            .into());
        }
        if metadata.raw_series != raw_series {
            return Err(StoreError::MetadataMismatch {
                existing: metadata.raw_series,
                expected: raw_series.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Name of the raw measurement series.
    pub fn raw_series(&self) -> &str {
        &self.raw_series
    }

    /// Where this store keeps its data.
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Number of distinct `(series, tags, time)` rows held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if a writer panicked.
    pub fn row_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.points)
    }
}

impl PointStore for Store {
    fn write_points(&self, points: &[Point]) -> Result<usize> {
        if self.read_only {
            let path = match &self.location {
                StoreLocation::Directory(path) => path.display().to_string(),
                StoreLocation::Memory => "memory://".to_string(),
            };
            return Err(StoreError::ReadOnly { path }.into());
        }

        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;

        // Later points in the batch compare against earlier ones, not only
        // against committed state.
        let mut staged = StoreState::default();
        let mut changes = Vec::with_capacity(points.len());
        for point in points {
            let fields: Fields = point
                .fields
                .iter()
                .filter(|(name, value)| {
                    staged
                        .field(point, name)
                        .or_else(|| state.field(point, name))
                        .is_none_or(|current| current.to_bits() != value.to_bits())
                })
                .map(|(name, value)| (name.clone(), *value))
                .collect();
            if fields.is_empty() {
                continue;
            }

            let change = Point {
                series: point.series.clone(),
                tags: point.tags.clone(),
                time: point.time,
                fields,
            };
            staged.apply(change.clone());
            changes.push(change);
        }

        if changes.is_empty() {
            return Ok(0);
        }

        {
            let mut journal = self.journal.lock().map_err(|_| StoreError::LockPoisoned)?;
            if let Some(journal) = journal.as_mut() {
                journal.append(&changes)?;
            }
        }

        let changed = changes.len();
        for change in changes {
            state.apply(change);
        }
        Ok(changed)
    }

    fn query(&self, query: &Query) -> Result<Vec<Row>> {
        if query.range.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        let Some(instances) = state.series.get(&query.series) else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for (tags, timeline) in instances {
            if !query.matches_tags(tags) {
                continue;
            }
            for (time, fields) in timeline.range(query.range.start..query.range.stop) {
                let fields: Fields = fields
                    .iter()
                    .filter(|(name, _)| query.selects_field(name))
                    .map(|(name, value)| (name.clone(), *value))
                    .collect();
                if fields.is_empty() {
                    continue;
                }
                rows.push(Row {
                    series: query.series.clone(),
                    tags: tags.clone(),
                    time: *time,
                    fields,
                });
            }
        }

        Ok(query.finish(rows))
    }

    fn tag_values(&self, series: &str, tag: &str, range: TimeRange) -> Result<BTreeSet<String>> {
        if range.is_empty() {
            return Ok(BTreeSet::new());
        }

        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        let values = state
            .series
            .get(series)
            .into_iter()
            .flatten()
            .filter(|(_, timeline)| timeline.range(range.start..range.stop).next().is_some())
            .filter_map(|(tags, _)| tags.get(tag).cloned())
            .collect();
        Ok(values)
    }
}
