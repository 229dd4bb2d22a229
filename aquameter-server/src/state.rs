//! Application state shared across request handlers and the scheduler.

use std::sync::Arc;
use std::time::Duration;

use aquameter::error::StoreError;
use aquameter::ingest::IngestGateway;
use aquameter::service::QueryService;
use aquameter::store::{PointStore, Store};
use aquameter::task::{TaskManager, TaskRegistry};

use crate::error::ApiError;

/// Shared handles to the store and the services built on it.
#[derive(Clone)]
pub struct AppState {
    /// Read views.
    pub query: QueryService<dyn PointStore>,
    /// Write path.
    pub ingest: IngestGateway<dyn PointStore>,
    /// Aggregation task lifecycle.
    pub tasks: Arc<TaskManager>,
    /// Bound on a single store call made for a request.
    pub store_timeout: Duration,
}

impl AppState {
    /// Wires the services around `store`, using the store's own task
    /// registry.
    pub fn new(store: Arc<Store>, store_timeout: Duration) -> Self {
        let tasks = Arc::new(TaskManager::new(TaskRegistry::for_store(&store)));
        let raw_series = store.raw_series().to_string();
        Self::with_tasks(store, &raw_series, tasks, store_timeout)
    }

    /// Wires the services around any [`PointStore`] with an explicit task
    /// manager.
    pub fn with_tasks(
        store: Arc<dyn PointStore>,
        raw_series: &str,
        tasks: Arc<TaskManager>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            query: QueryService::new(Arc::clone(&store), raw_series),
            ingest: IngestGateway::new(store, raw_series),
            tasks,
            store_timeout,
        }
    }

    /// Runs a store-bound closure on the blocking pool, bounded by
    /// `store_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if the call times out or the worker
    /// panics.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.store_timeout, handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ApiError::internal(&StoreError::Unavailable {
                reason: e.to_string(),
            })),
            Err(_) => Err(ApiError::internal(&StoreError::Timeout {
                after: self.store_timeout,
            })),
        }
    }
}
