//! Aggregation task definitions, registry, and lifecycle operations.
//!
//! One [`AggregationTask`] exists per `(width, stat)` pair. Tasks are kept in a
//! [`TaskRegistry`]: in memory for volatile stores, or in `tasks.json` next to
//! the point journal for file stores. The registry file is re-read on every
//! operation so that a running server picks up changes made by the CLI.
//! Changes to a file registry hold `tasks.json.lock`, which serializes them
//! across processes.
//!
//! # Example Usage
//!
//! ```rust
//! use aquameter::task::{TaskManager, TaskRegistry};
//!
//! let manager = TaskManager::new(TaskRegistry::in_memory());
//! let report = manager.setup_all();
//! assert!(report.is_success());
//! assert_eq!(report.created.len(), 8);
//!
//! // Provisioning is idempotent.
//! let again = manager.setup_all();
//! assert!(again.is_success());
//! assert_eq!(again.existing.len(), 8);
//! ```

use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StoreLocation;
use crate::error::TaskError;
use crate::measurement::StatType;
use crate::resolution::{Lookback, Width};
use crate::store::Store;
use crate::time::{TimeRange, align_down};

/// Name of the task registry file in a store directory.
pub const TASKS_FILE: &str = "tasks.json";

/// How long a change waits for another process's registry lock.
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Age after which a lock file is assumed to be left by a dead process.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

const LOCK_POLL: Duration = Duration::from_millis(2);

/// Serde helpers storing a [`TimeDelta`] as whole seconds.
pub mod seconds_serde {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes as an integer number of seconds.
    pub fn serialize<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(delta.num_seconds())
    }

    /// Deserializes from an integer number of seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        TimeDelta::try_seconds(seconds)
            .ok_or_else(|| serde::de::Error::custom(format!("duration of {seconds}s out of range")))
    }
}

/// Whether the scheduler runs a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Runs on schedule.
    #[default]
    Active,
    /// Registered but paused.
    Inactive,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        })
    }
}

/// A scheduled recurring aggregation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationTask {
    /// Unique name, `aggregate_{width}_{stat}`.
    pub name: String,
    /// Window width the task produces.
    pub width: Width,
    /// Statistic the task computes.
    pub stat: StatType,
    /// Interval between slots.
    #[serde(with = "seconds_serde")]
    pub every: TimeDelta,
    /// Delay after a slot boundary before the run fires.
    #[serde(with = "seconds_serde")]
    pub offset: TimeDelta,
    /// Range reprocessed by each run, relative to its slot.
    pub lookback: Lookback,
    /// Whether the task is scheduled.
    #[serde(default)]
    pub status: TaskStatus,
    /// When the task was registered.
    pub created_at: DateTime<Utc>,
    /// Slot of the last completed run.
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl AggregationTask {
    /// Canonical name of the task for `width` and `stat`.
    pub fn task_name(width: Width, stat: StatType) -> String {
        format!("aggregate_{}_{}", width.label(), stat.name())
    }

    /// Creates the definition for `width` and `stat` with the width's
    /// schedule.
    pub fn new(width: Width, stat: StatType, created_at: DateTime<Utc>) -> Self {
        Self {
            name: Self::task_name(width, stat),
            width,
            stat,
            every: width.every(),
            offset: width.offset(),
            lookback: width.lookback(),
            status: TaskStatus::Active,
            created_at,
            last_run: None,
        }
    }

    /// Every task the system maintains, one per width and statistic.
    pub fn catalogue(created_at: DateTime<Utc>) -> Vec<Self> {
        Width::ALL
            .into_iter()
            .flat_map(|width| StatType::ALL.into_iter().map(move |stat| (width, stat)))
            .map(|(width, stat)| Self::new(width, stat, created_at))
            .collect()
    }

    /// Range reprocessed by the run for slot `scheduled_at`.
    pub fn lookback_range(&self, scheduled_at: DateTime<Utc>) -> TimeRange {
        TimeRange::new(
            scheduled_at - self.lookback.start,
            scheduled_at - self.lookback.stop,
        )
    }

    /// Latest slot whose firing time is not after `now`.
    pub fn slot_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        align_down(now - self.offset, self.every)
    }

    /// Instant the run for `slot` fires.
    pub fn fires_at(&self, slot: DateTime<Utc>) -> DateTime<Utc> {
        slot + self.offset
    }

    /// Returns true if the scheduler should run this task.
    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }
}

/// Persistent collection of registered tasks.
///
/// File registries are written atomically (temp file + rename) and re-read
/// under both the in-process lock and the lock file before every change.
#[derive(Debug)]
pub struct TaskRegistry {
    path: Option<PathBuf>,
    tasks: Mutex<Vec<AggregationTask>>,
}

impl TaskRegistry {
    /// Creates an empty volatile registry.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Creates a registry persisted at `path`. The file is created on the
    /// first change.
    pub fn at_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The registry of a store at `location`: file-backed for directories,
    /// volatile for memory stores. The store itself is not opened.
    pub fn for_location(location: &StoreLocation) -> Self {
        match location {
            StoreLocation::Memory => Self::in_memory(),
            StoreLocation::Directory(dir) => Self::at_path(dir.join(TASKS_FILE)),
        }
    }

    /// The registry belonging to `store`.
    pub fn for_store(store: &Store) -> Self {
        Self::for_location(store.location())
    }

    /// Returns every registered task, in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] if the registry file cannot be read or parsed.
    pub fn load(&self) -> Result<Vec<AggregationTask>, TaskError> {
        let mut cached = self.tasks.lock().map_err(|_| TaskError::LockPoisoned)?;
        if let Some(path) = &self.path {
            *cached = read_registry(path)?;
        }
        Ok(cached.clone())
    }

    /// Applies `change` to the current task list and persists the result if
    /// `change` reports a modification.
    fn update<R>(
        &self,
        change: impl FnOnce(&mut Vec<AggregationTask>) -> (R, bool),
    ) -> Result<R, TaskError> {
        let mut cached = self.tasks.lock().map_err(|_| TaskError::LockPoisoned)?;
        let _lock = self.path.as_deref().map(LockFile::acquire).transpose()?;
        let mut tasks = match &self.path {
            Some(path) => read_registry(path)?,
            None => cached.clone(),
        };

        let (result, modified) = change(&mut tasks);
        if modified && let Some(path) = &self.path {
            write_registry(path, &tasks)?;
        }
        *cached = tasks;
        Ok(result)
    }
}

/// Exclusive cross-process hold on a registry file, released on drop.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(registry: &Path) -> Result<Self, TaskError> {
        let path = registry.with_extension("json.lock");
        let deadline = Instant::now() + LOCK_WAIT;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        tracing::warn!(path = %path.display(), "removing stale task registry lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(TaskError::RegistryBusy {
                            path: path.display().to_string(),
                        });
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => {
                    return Err(TaskError::RegistryLock {
                        path: path.display().to_string(),
                        source: e,
                    });
                }
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "failed to release task registry lock: {e}");
        }
    }
}

fn is_stale(lock: &Path) -> bool {
    fs::metadata(lock)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

fn read_registry(path: &Path) -> Result<Vec<AggregationTask>, TaskError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(TaskError::RegistryRead {
                path: path.display().to_string(),
                source: e,
            });
        }
    };
    serde_json::from_str(&content).map_err(|e| TaskError::RegistryParse {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_registry(path: &Path, tasks: &[AggregationTask]) -> Result<(), TaskError> {
    let content = serde_json::to_string_pretty(tasks)
        .map_err(|e| TaskError::RegistrySerialize { source: e })?;

    let temp = path.with_extension("json.tmp");
    fs::write(&temp, content)
        .and_then(|()| fs::rename(&temp, path))
        .map_err(|e| TaskError::RegistryWrite {
            path: path.display().to_string(),
            source: e,
        })
}

/// Outcome of provisioning the task catalogue.
#[derive(Debug, Default)]
pub struct SetupReport {
    /// Tasks created by this call.
    pub created: Vec<String>,
    /// Tasks that were already registered.
    pub existing: Vec<String>,
    /// Tasks whose creation failed.
    pub failed: Vec<(String, TaskError)>,
}

impl SetupReport {
    /// True if no creation failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of deleting a task by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The task was registered and has been removed.
    Removed,
    /// No task with that name was registered.
    NotFound,
}

/// Operator-level task lifecycle: provisioning, listing, deletion, pausing.
#[derive(Debug)]
pub struct TaskManager {
    registry: TaskRegistry,
}

impl TaskManager {
    /// Creates a manager over `registry`.
    pub fn new(registry: TaskRegistry) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Registers every catalogue task that is not registered yet.
    ///
    /// Each creation is a single attempt. A failure is recorded in the report
    /// and does not undo tasks created before it.
    pub fn setup_all(&self) -> SetupReport {
        let mut report = SetupReport::default();
        for task in AggregationTask::catalogue(Utc::now()) {
            let name = task.name.clone();
            let created = self.registry.update(|tasks| {
                if tasks.iter().any(|t| t.name == task.name) {
                    (false, false)
                } else {
                    tasks.push(task);
                    (true, true)
                }
            });

            match created {
                Ok(true) => {
                    tracing::info!(task = %name, "created aggregation task");
                    report.created.push(name);
                }
                Ok(false) => {
                    tracing::debug!(task = %name, "aggregation task already registered");
                    report.existing.push(name);
                }
                Err(e) => {
                    tracing::error!(task = %name, "failed to create aggregation task: {e}");
                    report.failed.push((name, e));
                }
            }
        }
        report
    }

    /// Returns every registered task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] if the registry cannot be read.
    pub fn list(&self) -> Result<Vec<AggregationTask>, TaskError> {
        self.registry.load()
    }

    /// Looks up one task by name.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] if the registry cannot be read.
    pub fn get(&self, name: &str) -> Result<Option<AggregationTask>, TaskError> {
        Ok(self.list()?.into_iter().find(|t| t.name == name))
    }

    /// Removes the task named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] if the registry cannot be read or written.
    pub fn delete(&self, name: &str) -> Result<DeleteOutcome, TaskError> {
        let outcome = self.registry.update(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.name != name);
            if tasks.len() == before {
                (DeleteOutcome::NotFound, false)
            } else {
                (DeleteOutcome::Removed, true)
            }
        })?;
        if outcome == DeleteOutcome::Removed {
            tracing::info!(task = %name, "deleted aggregation task");
        }
        Ok(outcome)
    }

    /// Removes every registered task and returns how many were removed.
    ///
    /// Best effort: a task that fails to delete is logged and skipped.
    pub fn delete_all(&self) -> usize {
        let tasks = match self.list() {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!("failed to read task registry: {e}");
                return 0;
            }
        };

        tasks
            .iter()
            .filter(|task| match self.delete(&task.name) {
                Ok(outcome) => outcome == DeleteOutcome::Removed,
                Err(e) => {
                    tracing::warn!(task = %task.name, "failed to delete aggregation task: {e}");
                    false
                }
            })
            .count()
    }

    /// Pauses or resumes a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::UnknownTask`] if no such task is registered, or a
    /// registry I/O error.
    pub fn set_status(&self, name: &str, status: TaskStatus) -> Result<(), TaskError> {
        let found = self.registry.update(|tasks| {
            match tasks.iter_mut().find(|t| t.name == name) {
                Some(task) => {
                    let changed = task.status != status;
                    task.status = status;
                    (true, changed)
                }
                None => (false, false),
            }
        })?;
        if !found {
            return Err(TaskError::UnknownTask {
                name: name.to_string(),
            });
        }
        tracing::info!(task = %name, %status, "aggregation task status set");
        Ok(())
    }

    /// Records `slot` as the last completed run of `name`.
    ///
    /// `last_run` never moves backwards. Recording a run for a task that has
    /// been deleted meanwhile is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] if the registry cannot be read or written.
    pub fn record_run(&self, name: &str, slot: DateTime<Utc>) -> Result<(), TaskError> {
        self.registry.update(|tasks| {
            match tasks.iter_mut().find(|t| t.name == name) {
                Some(task) if task.last_run.is_none_or(|last| last < slot) => {
                    task.last_run = Some(slot);
                    ((), true)
                }
                _ => ((), false),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_catalogue() {
        let tasks = AggregationTask::catalogue(Utc::now());
        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "aggregate_1m_mean",
                "aggregate_1m_min",
                "aggregate_1m_max",
                "aggregate_1m_count",
                "aggregate_5m_mean",
                "aggregate_5m_min",
                "aggregate_5m_max",
                "aggregate_5m_count",
            ]
        );
        assert!(tasks.iter().all(AggregationTask::is_active));
    }

    #[test]
    fn test_lookback_range() {
        let slot = at("2024-01-01T01:10:00Z");
        let one = AggregationTask::new(Width::OneMinute, StatType::Mean, slot);
        assert_eq!(
            one.lookback_range(slot),
            TimeRange::new(at("2024-01-01T01:08:00Z"), at("2024-01-01T01:09:00Z"))
        );

        let five = AggregationTask::new(Width::FiveMinutes, StatType::Mean, slot);
        assert_eq!(
            five.lookback_range(slot),
            TimeRange::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T00:05:00Z"))
        );
    }

    #[test]
    fn test_slot_at_honours_offset() {
        let task = AggregationTask::new(Width::OneMinute, StatType::Mean, Utc::now());
        assert_eq!(task.slot_at(at("2024-01-01T00:05:09Z")), at("2024-01-01T00:04:00Z"));
        assert_eq!(task.slot_at(at("2024-01-01T00:05:10Z")), at("2024-01-01T00:05:00Z"));
        assert_eq!(task.fires_at(at("2024-01-01T00:05:00Z")), at("2024-01-01T00:05:10Z"));

        let task = AggregationTask::new(Width::FiveMinutes, StatType::Max, Utc::now());
        assert_eq!(task.slot_at(at("2024-01-01T00:10:29Z")), at("2024-01-01T00:05:00Z"));
        assert_eq!(task.slot_at(at("2024-01-01T00:10:30Z")), at("2024-01-01T00:10:00Z"));
    }

    #[test]
    fn test_setup_is_idempotent() {
        let manager = TaskManager::new(TaskRegistry::in_memory());

        let first = manager.setup_all();
        assert!(first.is_success());
        assert_eq!(first.created.len(), 8);
        let tasks_after_first = manager.list().unwrap();

        let second = manager.setup_all();
        assert!(second.is_success());
        assert!(second.created.is_empty());
        assert_eq!(second.existing.len(), 8);
        assert_eq!(manager.list().unwrap(), tasks_after_first);
    }

    #[test]
    fn test_setup_fills_in_missing_tasks() {
        let manager = TaskManager::new(TaskRegistry::in_memory());
        manager.setup_all();
        assert_eq!(manager.delete("aggregate_5m_count").unwrap(), DeleteOutcome::Removed);

        let report = manager.setup_all();
        assert_eq!(report.created, vec!["aggregate_5m_count".to_string()]);
        assert_eq!(report.existing.len(), 7);
    }

    #[test]
    fn test_setup_reports_failures() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let manager = TaskManager::new(TaskRegistry::at_path(blocker.join(TASKS_FILE)));
        let report = manager.setup_all();
        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 8);
        assert!(report.created.is_empty());
    }

    #[test]
    fn test_delete() {
        let manager = TaskManager::new(TaskRegistry::in_memory());
        manager.setup_all();

        assert_eq!(manager.delete("aggregate_1m_mean").unwrap(), DeleteOutcome::Removed);
        assert_eq!(manager.delete("aggregate_1m_mean").unwrap(), DeleteOutcome::NotFound);
        assert_eq!(manager.list().unwrap().len(), 7);

        assert_eq!(manager.delete_all(), 7);
        assert!(manager.list().unwrap().is_empty());
        assert_eq!(manager.delete_all(), 0);
    }

    #[test]
    fn test_set_status() {
        let manager = TaskManager::new(TaskRegistry::in_memory());
        manager.setup_all();

        manager
            .set_status("aggregate_5m_min", TaskStatus::Inactive)
            .unwrap();
        let task = manager.get("aggregate_5m_min").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Inactive);
        assert!(!task.is_active());

        let err = manager.set_status("aggregate_15m_min", TaskStatus::Active);
        assert!(matches!(err, Err(TaskError::UnknownTask { .. })));
    }

    #[test]
    fn test_record_run_only_advances() {
        let manager = TaskManager::new(TaskRegistry::in_memory());
        manager.setup_all();

        manager
            .record_run("aggregate_1m_max", at("2024-01-01T00:05:00Z"))
            .unwrap();
        manager
            .record_run("aggregate_1m_max", at("2024-01-01T00:03:00Z"))
            .unwrap();
        manager.record_run("gone", at("2024-01-01T00:03:00Z")).unwrap();

        let task = manager.get("aggregate_1m_max").unwrap().unwrap();
        assert_eq!(task.last_run, Some(at("2024-01-01T00:05:00Z")));
    }

    #[test]
    fn test_file_registry_is_shared_between_managers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TASKS_FILE);

        let server = TaskManager::new(TaskRegistry::at_path(&path));
        let cli = TaskManager::new(TaskRegistry::at_path(&path));
        assert!(server.setup_all().is_success());

        cli.set_status("aggregate_1m_count", TaskStatus::Inactive)
            .unwrap();
        let task = server.get("aggregate_1m_count").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Inactive);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"every\": 60"));
        assert!(content.contains("\"status\": \"inactive\""));
        assert!(!dir.path().join("tasks.json.tmp").exists());
    }

    #[test]
    fn test_corrupted_registry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TASKS_FILE);
        fs::write(&path, "{ not json").unwrap();

        let manager = TaskManager::new(TaskRegistry::at_path(&path));
        assert!(matches!(manager.list(), Err(TaskError::RegistryParse { .. })));
        assert!(!manager.setup_all().is_success());
    }

    #[test]
    fn test_concurrent_changes_from_two_processes_are_not_lost() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TASKS_FILE);
        let scheduler = TaskManager::new(TaskRegistry::at_path(&path));
        let operator = TaskManager::new(TaskRegistry::at_path(&path));
        assert!(scheduler.setup_all().is_success());

        let names: Vec<String> = StatType::ALL
            .iter()
            .map(|&stat| AggregationTask::task_name(Width::OneMinute, stat))
            .collect();
        let base = at("2024-01-01T00:00:00Z");

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for minute in 1..=20 {
                    for name in &names {
                        scheduler
                            .record_run(name, base + TimeDelta::minutes(minute))
                            .unwrap();
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            });
            scope.spawn(|| {
                for round in 0..20 {
                    let status = if round % 2 == 0 {
                        TaskStatus::Active
                    } else {
                        TaskStatus::Inactive
                    };
                    for name in &names {
                        operator.set_status(name, status).unwrap();
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            });
        });

        for name in &names {
            let task = scheduler.get(name).unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Inactive, "{name}");
            assert_eq!(task.last_run, Some(base + TimeDelta::minutes(20)), "{name}");
        }
        assert!(!dir.path().join("tasks.json.lock").exists());
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TASKS_FILE);
        let manager = TaskManager::new(TaskRegistry::at_path(&path));
        assert!(manager.setup_all().is_success());

        let lock = dir.path().join("tasks.json.lock");
        let file = fs::File::create(&lock).unwrap();
        file.set_modified(std::time::SystemTime::now() - Duration::from_secs(120))
            .unwrap();
        drop(file);

        manager
            .set_status("aggregate_5m_min", TaskStatus::Inactive)
            .unwrap();
        assert!(!lock.exists());
    }

    #[test]
    fn test_registry_for_location() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::Directory(dir.path().to_path_buf());
        let manager = TaskManager::new(TaskRegistry::for_location(&location));
        assert!(manager.setup_all().is_success());
        assert!(dir.path().join(TASKS_FILE).exists());
        // Only the registry is touched.
        assert!(!dir.path().join("points.jsonl").exists());

        let volatile = TaskManager::new(TaskRegistry::for_location(&StoreLocation::Memory));
        assert!(volatile.list().unwrap().is_empty());
    }
}
