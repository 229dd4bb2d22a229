//! # aquameter-server
//!
//! HTTP ingestion and query service for aquameter.
//!
//! The binary opens the configured store, provisions the aggregation tasks,
//! starts the [`Scheduler`], and serves the router built by
//! [`create_router`]:
//!
//! - `GET  /health`
//! - `POST /measurements`
//! - `GET  /measurements/:sensor_id`
//! - `GET  /measurements/:sensor_id/aggregated`
//! - `GET  /measurements/:sensor_id/statistics`
//! - `GET  /sensors`

pub mod error;
pub mod handlers;
pub mod router;
pub mod scheduler;
pub mod state;

pub use error::ApiError;
pub use router::create_router;
pub use scheduler::Scheduler;
pub use state::AppState;
