//! Deciding which aggregation runs are due.
//!
//! The [`Dispatcher`] is a pure planner: given the registered tasks and the
//! current time it returns the [`Job`]s that should run now. It owns no
//! timer; the server drives it from a periodic tick and executes each job on
//! a worker.
//!
//! # Slots
//!
//! A task's slots are the multiples of its `every` since the epoch. Slot `T`
//! fires at `T + offset` and reprocesses the task's lookback relative to `T`.
//! A job covers every slot after the task's `last_run` up to the current one,
//! so runs missed while the process was down are caught up. A task seen for
//! the first time only runs its current slot.
//!
//! # Overlap
//!
//! Each job holds an in-flight marker for its task until it is dropped. While
//! the marker is held the dispatcher produces no further job for that task;
//! slots skipped this way are covered by the next job through catch-up.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::aggregate::{AggregationEngine, RunSummary};
use crate::error::Result;
use crate::store::PointStore;
use crate::task::{AggregationTask, TaskManager};

/// Most slots a single job will catch up on.
pub const MAX_CATCH_UP_SLOTS: usize = 1440;

type InFlightSet = Arc<Mutex<HashSet<String>>>;

/// Marks a task as running until dropped.
#[derive(Debug)]
struct InFlight {
    name: String,
    set: InFlightSet,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.name);
        }
    }
}

/// One due run of a task, covering one or more slots in ascending order.
#[derive(Debug)]
pub struct Job {
    /// Task definition as registered when the job was planned.
    pub task: AggregationTask,
    /// Slots to process, oldest first.
    pub slots: Vec<DateTime<Utc>>,
    _in_flight: InFlight,
}

impl Job {
    /// Runs every slot of the job in order, then records the last slot as
    /// the task's `last_run`.
    ///
    /// A failing slot aborts the job with nothing recorded; the next job
    /// repeats the slots, rewriting identical rows.
    ///
    /// # Errors
    ///
    /// Returns the store error of the failing slot, or the registry error if
    /// the completed run could not be recorded.
    pub fn execute<S: PointStore + ?Sized>(
        &self,
        engine: &AggregationEngine<'_, S>,
        tasks: &TaskManager,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let summary = engine.run_slots(&self.task, &self.slots, now)?;
        if let Some(&last) = self.slots.last() {
            tasks.record_run(&self.task.name, last)?;
        }
        Ok(summary)
    }
}

/// Plans due aggregation runs.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    in_flight: InFlightSet,
}

impl Dispatcher {
    /// Creates a dispatcher with no task in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a job for `name` is still held.
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(name))
            .unwrap_or(false)
    }

    /// Returns the jobs due at `now`.
    ///
    /// Inactive tasks, tasks already in flight, and tasks whose current slot
    /// has been recorded produce no job.
    pub fn due(&self, tasks: &[AggregationTask], now: DateTime<Utc>) -> Vec<Job> {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            tracing::error!("dispatcher in-flight set poisoned");
            return Vec::new();
        };

        let mut jobs = Vec::new();
        for task in tasks.iter().filter(|t| t.is_active()) {
            if in_flight.contains(&task.name) {
                tracing::debug!(task = %task.name, "previous run still in flight");
                continue;
            }

            let slots = pending_slots(task, now);
            if slots.is_empty() {
                continue;
            }

            in_flight.insert(task.name.clone());
            jobs.push(Job {
                task: task.clone(),
                slots,
                _in_flight: InFlight {
                    name: task.name.clone(),
                    set: Arc::clone(&self.in_flight),
                },
            });
        }
        jobs
    }
}

/// Slots of `task` that have fired by `now` and are not yet recorded.
fn pending_slots(task: &AggregationTask, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let current = task.slot_at(now);
    let Some(last_run) = task.last_run else {
        return vec![current];
    };
    if last_run >= current {
        return Vec::new();
    }

    let mut slots = Vec::new();
    let mut slot = current;
    while slot > last_run && slots.len() < MAX_CATCH_UP_SLOTS {
        slots.push(slot);
        slot -= task.every;
    }
    if slot > last_run {
        tracing::warn!(
            task = %task.name,
            since = %last_run,
            "catch-up capped at {MAX_CATCH_UP_SLOTS} slots"
        );
    }
    slots.reverse();
    slots
}
