//! HTTP request handlers.
//!
//! Every store call runs on the blocking pool through
//! [`AppState::run_blocking`]; handlers only translate between HTTP and the
//! library's services.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use aquameter::measurement::Measurement;
use aquameter::service::{AggregatedPoint, StatisticsRecord, parse_limit};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters shared by the measurement read endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    /// Range start: relative (`-1h`) or RFC 3339.
    pub start: Option<String>,
    /// Range end; defaults to now.
    pub end: Option<String>,
    /// Raw reads only: maximum rows.
    pub limit: Option<String>,
    /// Aggregated reads only: explicit resolution.
    pub window: Option<String>,
}

/// Body of `GET /health`.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `healthy`.
    pub status: &'static str,
    /// Current UTC time.
    pub timestamp: String,
}

/// Body of a successful `POST /measurements`.
#[derive(Serialize)]
pub struct CreatedResponse {
    /// Always `Success`.
    pub message: &'static str,
    /// Sensor of the stored measurement.
    pub sensor_id: String,
}

/// Body of `GET /measurements/:sensor_id`.
#[derive(Serialize)]
pub struct RawResponse {
    /// Requested sensor.
    pub sensor_id: String,
    /// Number of measurements returned.
    pub count: usize,
    /// Measurements, newest first.
    pub measurements: Vec<Measurement>,
}

/// Body of `GET /sensors`.
#[derive(Serialize)]
pub struct SensorsResponse {
    /// Number of sensors.
    pub count: usize,
    /// Sorted sensor ids.
    pub sensors: Vec<String>,
}

/// Body of `GET /measurements/:sensor_id/aggregated`.
#[derive(Serialize)]
pub struct AggregatedResponse {
    /// Requested sensor.
    pub sensor_id: String,
    /// Number of windows returned.
    pub count: usize,
    /// Resolution the windows were read from.
    pub window: String,
    /// Per-window means, newest first.
    pub measurements: Vec<AggregatedPoint>,
}

/// Body of `GET /measurements/:sensor_id/statistics`.
#[derive(Serialize)]
pub struct StatisticsResponse {
    /// Requested sensor.
    pub sensor_id: String,
    /// Number of windows returned.
    pub count: usize,
    /// Resolution the windows were read from.
    pub window: String,
    /// Per-window statistics, newest first.
    pub statistics: Vec<StatisticsRecord>,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

/// `POST /measurements`
pub async fn create_measurement(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let gateway = state.ingest.clone();
    let accepted = state.run_blocking(move || gateway.submit(&body)).await??;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Success",
            sensor_id: accepted.sensor_id,
        }),
    ))
}

/// `GET /measurements/:sensor_id`
pub async fn get_measurements(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<RawResponse>, ApiError> {
    let limit = parse_limit(params.limit.as_deref()).map_err(aquameter::AquaError::from)?;

    let service = state.query.clone();
    let id = sensor_id.clone();
    let measurements = state
        .run_blocking(move || {
            service.get_raw(
                &id,
                params.start.as_deref(),
                params.end.as_deref(),
                limit,
                Utc::now(),
            )
        })
        .await??;

    Ok(Json(RawResponse {
        sensor_id,
        count: measurements.len(),
        measurements,
    }))
}

/// `GET /sensors`
pub async fn list_sensors(State(state): State<AppState>) -> Result<Json<SensorsResponse>, ApiError> {
    let service = state.query.clone();
    let sensors = state
        .run_blocking(move || service.list_sensors(Utc::now()))
        .await??;

    Ok(Json(SensorsResponse {
        count: sensors.len(),
        sensors,
    }))
}

/// `GET /measurements/:sensor_id/aggregated`
pub async fn get_aggregated(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<AggregatedResponse>, ApiError> {
    let service = state.query.clone();
    let id = sensor_id.clone();
    let result = state
        .run_blocking(move || {
            service.get_aggregated(
                &id,
                params.start.as_deref(),
                params.end.as_deref(),
                params.window.as_deref(),
                Utc::now(),
            )
        })
        .await??;

    Ok(Json(AggregatedResponse {
        sensor_id,
        count: result.records.len(),
        window: result.window.to_string(),
        measurements: result.records,
    }))
}

/// `GET /measurements/:sensor_id/statistics`
pub async fn get_statistics(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let service = state.query.clone();
    let id = sensor_id.clone();
    let result = state
        .run_blocking(move || {
            service.get_statistics(
                &id,
                params.start.as_deref(),
                params.end.as_deref(),
                params.window.as_deref(),
                Utc::now(),
            )
        })
        .await??;

    Ok(Json(StatisticsResponse {
        sensor_id,
        count: result.records.len(),
        window: result.window.to_string(),
        statistics: result.records,
    }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
