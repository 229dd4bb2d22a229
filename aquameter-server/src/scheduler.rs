//! Background driver for the aggregation tasks.
//!
//! Once per tick the registry is reloaded, the [`Dispatcher`] plans the due
//! jobs, and each job runs on the blocking pool. Jobs of different tasks run
//! side by side; a task whose previous job is still running is skipped until
//! it finishes.

use std::sync::Arc;
use std::time::Duration;

use aquameter::aggregate::AggregationEngine;
use aquameter::schedule::{Dispatcher, Job};
use aquameter::store::Store;
use aquameter::task::TaskManager;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Interval between dispatcher ticks.
pub const TICK: Duration = Duration::from_secs(1);

/// Drives aggregation runs for one store.
#[derive(Debug)]
pub struct Scheduler {
    store: Arc<Store>,
    tasks: Arc<TaskManager>,
    dispatcher: Dispatcher,
}

impl Scheduler {
    /// Creates a scheduler for `store`'s tasks.
    pub fn new(store: Arc<Store>, tasks: Arc<TaskManager>) -> Self {
        Self {
            store,
            tasks,
            dispatcher: Dispatcher::new(),
        }
    }

    /// Ticks forever at `period`.
    pub async fn run(self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(period = ?period, "aggregation scheduler started");

        loop {
            interval.tick().await;
            self.tick(Utc::now()).await;
        }
    }

    /// Spawns every job due at `now` and returns their handles.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let tasks = Arc::clone(&self.tasks);
        let registered = match tokio::task::spawn_blocking(move || tasks.list()).await {
            Ok(Ok(registered)) => registered,
            Ok(Err(e)) => {
                tracing::warn!("failed to load task registry: {e}");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("task registry load aborted: {e}");
                return Vec::new();
            }
        };

        self.dispatcher
            .due(&registered, now)
            .into_iter()
            .map(|job| self.spawn(job))
            .collect()
    }

    fn spawn(&self, job: Job) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let tasks = Arc::clone(&self.tasks);

        tokio::task::spawn_blocking(move || {
            let engine = AggregationEngine::new(store.as_ref(), store.raw_series());
            match job.execute(&engine, &tasks, Utc::now()) {
                Ok(summary) => tracing::debug!(
                    task = %job.task.name,
                    slots = job.slots.len(),
                    windows = summary.windows,
                    written = summary.rows_written,
                    "aggregation job finished"
                ),
                Err(e) => tracing::error!(task = %job.task.name, "aggregation job failed: {e}"),
            }
        })
    }
}
