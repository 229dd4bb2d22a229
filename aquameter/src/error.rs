//! Error types for aquameter.

use std::time::Duration;

use thiserror::Error;

/// The main error type for store, query, and task operations.
///
/// Ingestion rejections are reported separately through [`ValidationError`]
/// so that callers can tell bad input apart from an unavailable store.
#[derive(Error, Debug)]
pub enum AquaError {
    /// The measurement store failed or could not be reached.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A read request carried invalid parameters.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// An aggregation task operation failed.
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Configuration could not be interpreted.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AquaError {
    /// Returns true if the error was caused by the caller's input rather than
    /// by the store or the process environment.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

/// Errors raised by the embedded measurement store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store directory could not be created or accessed.
    #[error("failed to access store directory '{path}': {source}")]
    DirectoryAccess {
        /// The path that could not be accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending to the point journal failed.
    #[error("failed to append to journal '{path}': {source}")]
    JournalWrite {
        /// The journal path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the point journal failed.
    #[error("failed to read journal '{path}': {source}")]
    JournalRead {
        /// The journal path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A journal line could not be decoded.
    #[error("corrupted journal '{path}' at line {line}: {source}")]
    CorruptedJournal {
        /// The journal path.
        path: String,
        /// One-based line number of the bad entry.
        line: usize,
        /// The decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A point could not be encoded for the journal.
    #[error("failed to encode point: {source}")]
    Encode {
        /// The encode error.
        #[source]
        source: serde_json::Error,
    },

    /// The metadata file (meta.json) is corrupted or invalid.
    #[error("corrupted metadata file: {reason}")]
    CorruptedMetadata {
        /// Description of what was invalid about the metadata.
        reason: String,
    },

    /// The store on disk was created for a different raw series.
    #[error("store holds raw series '{existing}' but '{expected}' was requested")]
    MetadataMismatch {
        /// Raw series recorded in meta.json.
        existing: String,
        /// Raw series the caller configured.
        expected: String,
    },

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// A store call did not complete within the configured bound.
    #[error("store call timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The store call could not be executed at all.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Why the call could not run.
        reason: String,
    },

    /// A write reached a store opened read-only.
    #[error("store '{path}' is open read-only")]
    ReadOnly {
        /// The store directory.
        path: String,
    },
}

/// Errors in read-request parameters.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The `limit` parameter is not a non-negative integer.
    #[error("Invalid limit parameter")]
    InvalidLimit {
        /// The raw value supplied.
        value: String,
    },

    /// A `start` or `end` parameter could not be parsed.
    #[error("invalid {param} parameter: {source}")]
    InvalidTime {
        /// Which parameter was invalid.
        param: &'static str,
        /// The parse failure.
        #[source]
        source: TimeSpecError,
    },
}

/// Errors parsing a relative or absolute time specification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeSpecError {
    /// The specification is empty.
    #[error("empty time specification")]
    Empty,

    /// The specification is neither a relative duration nor an RFC 3339 instant.
    #[error("'{spec}' is neither a relative duration nor an RFC 3339 instant")]
    Unrecognized {
        /// The rejected input.
        spec: String,
    },

    /// The duration is too large to represent.
    #[error("duration '{spec}' is out of range")]
    OutOfRange {
        /// The rejected input.
        spec: String,
    },
}

/// Errors raised while provisioning or maintaining aggregation tasks.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The registry file exists but could not be read.
    #[error("failed to read task registry '{path}': {source}")]
    RegistryRead {
        /// The registry path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The registry file could not be parsed.
    #[error("failed to parse task registry '{path}': {source}")]
    RegistryParse {
        /// The registry path.
        path: String,
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The registry could not be serialized.
    #[error("failed to serialize task registry: {source}")]
    RegistrySerialize {
        /// The serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The registry file could not be written.
    #[error("failed to write task registry '{path}': {source}")]
    RegistryWrite {
        /// The registry path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The registry lock file could not be created.
    #[error("failed to lock task registry '{path}': {source}")]
    RegistryLock {
        /// The lock file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Another process held the registry lock for longer than the wait bound.
    #[error("task registry '{path}' is locked by another process")]
    RegistryBusy {
        /// The lock file path.
        path: String,
    },

    /// A thread panicked while holding the registry lock.
    #[error("task registry lock poisoned")]
    LockPoisoned,

    /// No task with this name is registered.
    #[error("task '{name}' is not registered")]
    UnknownTask {
        /// The requested task name.
        name: String,
    },
}

/// Errors interpreting store configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The store URL scheme is not supported by the embedded engine.
    #[error("unsupported store url '{url}' (expected memory:// or file://<path>)")]
    UnsupportedScheme {
        /// The rejected URL.
        url: String,
    },

    /// A file:// URL without a path.
    #[error("store url '{url}' has no path")]
    EmptyPath {
        /// The rejected URL.
        url: String,
    },

    /// A name used as a directory or series component is invalid.
    #[error("invalid {field} '{value}': must be non-empty and free of path separators")]
    InvalidName {
        /// Which option was invalid.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Reasons an ingestion payload is rejected.
///
/// The [`Display`](std::fmt::Display) text is the `error` message returned to
/// the sender.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The body is not a JSON object.
    #[error("request body must be a JSON object")]
    MalformedBody {
        /// Decoder detail, kept for logging.
        reason: String,
    },

    /// One or more required fields are absent or null.
    #[error("Missing required fields")]
    MissingFields {
        /// Names of the absent fields, in declaration order.
        fields: Vec<&'static str>,
    },

    /// A numeric field holds a non-numeric value.
    #[error("{field} must be a number")]
    NotANumber {
        /// The offending field.
        field: &'static str,
    },

    /// `sensor_id` is not a non-empty string.
    #[error("sensor_id must be a non-empty string")]
    InvalidSensorId,

    /// `timestamp` is not an RFC 3339 instant.
    #[error("timestamp must be an RFC 3339 instant")]
    InvalidTimestamp {
        /// The rejected value.
        value: String,
    },
}

impl ValidationError {
    /// Field names to report under `missing`, if any.
    pub fn missing_fields(&self) -> Option<&[&'static str]> {
        match self {
            Self::MissingFields { fields } => Some(fields),
            _ => None,
        }
    }
}

/// Convenience result type using [`AquaError`].
pub type Result<T> = std::result::Result<T, AquaError>;
