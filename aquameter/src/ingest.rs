//! Ingestion gateway: validating submitted measurements and storing them.
//!
//! Validation fails closed and runs in a fixed order:
//!
//! 1. the body is a JSON object
//! 2. `sensor_id`, `timestamp`, `temperature` and `conductivity` are present
//!    and not `null` (all missing names are reported together)
//! 3. `temperature`, then `conductivity`, is a JSON number
//! 4. `sensor_id` is a non-empty string
//! 5. `timestamp` is an RFC 3339 instant
//!
//! A store failure after validation is reported as
//! [`IngestError::Unavailable`], never as a rejection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{AquaError, ValidationError};
use crate::measurement::Measurement;
use crate::store::PointStore;

/// Fields every submission must carry, in reporting order.
pub const REQUIRED_FIELDS: [&str; 4] = ["sensor_id", "timestamp", "temperature", "conductivity"];

/// Why a submission was not stored.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The payload failed validation.
    #[error("{0}")]
    Rejected(#[from] ValidationError),

    /// The payload was valid but the store could not accept it.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] AquaError),
}

/// A stored submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Sensor the measurement belongs to.
    pub sensor_id: String,
    /// False if an identical measurement was already stored.
    pub changed: bool,
}

/// Validates measurement payloads and writes them to the raw series.
#[derive(Debug)]
pub struct IngestGateway<S: PointStore + ?Sized> {
    store: Arc<S>,
    raw_series: String,
}

impl<S: PointStore + ?Sized> Clone for IngestGateway<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            raw_series: self.raw_series.clone(),
        }
    }
}

impl<S: PointStore + ?Sized> IngestGateway<S> {
    /// Creates a gateway writing to `raw_series`.
    pub fn new(store: Arc<S>, raw_series: impl Into<String>) -> Self {
        Self {
            store,
            raw_series: raw_series.into(),
        }
    }

    /// Validates and stores one JSON-encoded measurement.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Rejected`] for invalid payloads and
    /// [`IngestError::Unavailable`] if the store write fails.
    pub fn submit(&self, body: &[u8]) -> Result<Accepted, IngestError> {
        let measurement = parse_measurement(body).inspect_err(|e| {
            tracing::debug!(missing = ?e.missing_fields(), "rejected measurement: {e}");
        })?;
        self.store_measurement(&measurement)
    }

    /// Stores an already validated measurement.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Unavailable`] if the store write fails.
    pub fn store_measurement(&self, measurement: &Measurement) -> Result<Accepted, IngestError> {
        let written = self
            .store
            .write_points(&[measurement.to_point(&self.raw_series)])
            .map_err(|e| {
                tracing::error!(sensor_id = %measurement.sensor_id, "failed to store measurement: {e}");
                IngestError::Unavailable(e)
            })?;

        tracing::debug!(
            sensor_id = %measurement.sensor_id,
            timestamp = %measurement.timestamp,
            changed = written > 0,
            "measurement stored"
        );
        Ok(Accepted {
            sensor_id: measurement.sensor_id.clone(),
            changed: written > 0,
        })
    }
}

/// Decodes and validates a measurement payload.
///
/// # Errors
///
/// Returns the first [`ValidationError`] in the documented check order.
///
/// # Examples
///
/// ```rust
/// use aquameter::error::ValidationError;
/// use aquameter::ingest::parse_measurement;
///
/// let err = parse_measurement(br#"{"sensor_id": "s1", "temperature": 20.5}"#).unwrap_err();
/// assert_eq!(
///     err,
///     ValidationError::MissingFields { fields: vec!["timestamp", "conductivity"] }
/// );
/// ```
pub fn parse_measurement(body: &[u8]) -> Result<Measurement, ValidationError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| ValidationError::MalformedBody {
        reason: e.to_string(),
    })?;
    let Value::Object(object) = value else {
        return Err(ValidationError::MalformedBody {
            reason: "top-level value is not an object".to_string(),
        });
    };

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .into_iter()
        .filter(|name| object.get(*name).is_none_or(Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields { fields: missing });
    }

    let temperature = number(&object, "temperature")?;
    let conductivity = number(&object, "conductivity")?;

    let sensor_id = object
        .get("sensor_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::InvalidSensorId)?;

    let timestamp = object
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| ValidationError::InvalidTimestamp {
            value: object
                .get("timestamp")
                .map(Value::to_string)
                .unwrap_or_default(),
        })?;

    Ok(Measurement {
        sensor_id: sensor_id.to_string(),
        timestamp,
        temperature,
        conductivity,
    })
}

fn number(object: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    object
        .get(field)
        .and_then(Value::as_f64)
        .ok_or(ValidationError::NotANumber { field })
}
