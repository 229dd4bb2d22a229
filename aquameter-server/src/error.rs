//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use aquameter::error::{AquaError, ValidationError};
use aquameter::ingest::IngestError;

/// Message returned for every store failure.
pub const INTERNAL_ERROR: &str = "Internal server error";

/// An error rendered as a JSON response.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Rejected measurement payload (400).
    #[error("{0}")]
    Validation(ValidationError),

    /// Malformed request parameter (400).
    #[error("{0}")]
    BadRequest(String),

    /// Store failure (500); the detail is echoed under `details`.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Unknown route (404).
    #[error("not found")]
    NotFound,
}

impl ApiError {
    /// Wraps a store-side failure.
    pub fn internal(error: &dyn std::error::Error) -> Self {
        Self::Internal(error.to_string())
    }

    /// HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<AquaError> for ApiError {
    fn from(error: AquaError) -> Self {
        match error {
            AquaError::Query(e) => Self::BadRequest(e.to_string()),
            other => Self::internal(&other),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Rejected(e) => Self::Validation(e),
            IngestError::Unavailable(e) => Self::internal(&e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<&'a [&'static str]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(e) => {
                tracing::debug!("rejected request: {e}");
                ErrorBody {
                    error: e.to_string(),
                    missing: e.missing_fields(),
                    details: None,
                }
            }
            Self::BadRequest(message) => {
                tracing::debug!("bad request: {message}");
                ErrorBody {
                    error: message.clone(),
                    missing: None,
                    details: None,
                }
            }
            Self::Internal(details) => {
                tracing::error!("request failed: {details}");
                ErrorBody {
                    error: INTERNAL_ERROR.to_string(),
                    missing: None,
                    details: Some(details),
                }
            }
            Self::NotFound => ErrorBody {
                error: "not found".to_string(),
                missing: None,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
