//! # aquameter
//!
//! Sensor measurement store with scheduled multi-resolution downsampling.
//!
//! aquameter ingests periodic water-quality readings (temperature and
//! conductivity per sensor), keeps them in an embedded time-series store, and
//! continuously folds them into one-minute and five-minute summaries (mean,
//! min, max, count). Read requests are answered from the raw series or from
//! the summary resolution that fits the requested range.
//!
//! ## Key Properties
//!
//! - Aggregate windows are epoch-aligned and tile time without gaps or overlap
//! - A window is computed only once it is closed; empty windows produce no row
//! - Re-running an aggregation is a no-op in the store
//! - Resolution selection is a pure function of the request
//! - Queries are typed values; no query text is ever built from input
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use aquameter::aggregate::AggregationEngine;
//! use aquameter::ingest::IngestGateway;
//! use aquameter::measurement::StatType;
//! use aquameter::resolution::Width;
//! use aquameter::service::QueryService;
//! use aquameter::store::Store;
//! use aquameter::time::TimeRange;
//! use chrono::{DateTime, TimeDelta, Utc};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(Store::in_memory("measurements"));
//!
//! let gateway = IngestGateway::new(Arc::clone(&store), "measurements");
//! gateway.submit(br#"{
//!     "sensor_id": "sensor_001",
//!     "timestamp": "2024-01-01T00:00:05Z",
//!     "temperature": 20.0,
//!     "conductivity": 1500.0
//! }"#)?;
//!
//! let now: DateTime<Utc> = "2024-01-01T00:10:00Z".parse()?;
//! let engine = AggregationEngine::new(store.as_ref(), "measurements");
//! engine.aggregate_range(
//!     Width::OneMinute,
//!     &StatType::ALL,
//!     TimeRange::new(now - TimeDelta::minutes(10), now),
//!     now,
//! )?;
//!
//! let service = QueryService::new(Arc::clone(&store), "measurements");
//! let stats = service.get_statistics("sensor_001", Some("-30m"), None, None, now)?;
//! assert_eq!(stats.records[0].temperature.count, Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`] — Embedded store behind the [`PointStore`] trait
//! - [`AggregationEngine`] — Computes and writes aggregate windows
//! - [`TaskManager`] — Provisions and maintains the aggregation tasks
//! - [`Dispatcher`] — Plans due runs, with catch-up and overlap protection
//! - [`QueryService`] — Raw, aggregated and statistics read views
//! - [`IngestGateway`] — Validates and stores submitted measurements
//!
//! ## Modules
//!
//! - [`store`] — Store lifecycle, writes and typed reads
//! - [`journal`] — Append-only point journal of file stores
//! - [`point`] — Points and rows
//! - [`query`] — Typed query description
//! - [`time`] — Time specifications, ranges and alignment
//! - [`measurement`] — Measurements, fields and statistics
//! - [`resolution`] — Window widths and resolution selection
//! - [`aggregate`] — Aggregation engine
//! - [`task`] — Task definitions, registry and lifecycle
//! - [`schedule`] — Run planning
//! - [`service`] — Query service
//! - [`ingest`] — Ingestion gateway
//! - [`config`] — Store configuration
//! - [`error`] — Error types

pub mod aggregate;
pub mod config;
pub mod error;
pub mod ingest;
pub mod journal;
pub mod measurement;
pub mod point;
pub mod query;
pub mod resolution;
pub mod schedule;
pub mod service;
pub mod store;
pub mod task;
pub mod time;

// Re-export primary API types at crate root for convenience.
pub use aggregate::{AggregationEngine, RunSummary};
pub use config::StoreConfig;
pub use error::{AquaError, Result, ValidationError};
pub use ingest::{IngestError, IngestGateway};
pub use measurement::{Measurement, StatType};
pub use resolution::{Resolution, Width, select_window};
pub use schedule::{Dispatcher, Job};
pub use service::QueryService;
pub use store::{PointStore, Store};
pub use task::{AggregationTask, TaskManager, TaskRegistry};
