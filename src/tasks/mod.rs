//! Persistent tracking for long-running background work.
//!
//! The harness enforces the task lifecycle: `Pending -> Running ->
//! Completed | Failed`, with `Cancelled` reachable from the two live
//! states. Illegal moves are rejected without touching the stored row,
//! and every accepted transition appends to the task's bounded log.

use crate::models::{Task, TaskId, TaskLogEntry, TaskPriority, TaskStatus};
use crate::storage::acquire_lock;
use crate::{Error, Result, current_timestamp};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// `SQLite`-backed store and state machine for background tasks.
pub struct TaskHarness {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database (None for in-memory).
    db_path: Option<PathBuf>,
}

struct TaskRow {
    id: String,
    description: String,
    kind: String,
    priority: String,
    status: String,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    progress: f64,
    result: Option<String>,
    error: Option<String>,
    log: String,
}

impl TaskHarness {
    /// Creates a new task harness at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_task_store".to_string(),
            cause: e.to_string(),
        })?;

        let harness = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        harness.initialize()?;
        Ok(harness)
    }

    /// Creates an in-memory task harness (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_task_store_memory".to_string(),
            cause: e.to_string(),
        })?;

        let harness = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        harness.initialize()?;
        Ok(harness)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Initializes the database schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                kind TEXT NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                progress REAL NOT NULL DEFAULT 0.0,
                result TEXT,
                error TEXT,
                log TEXT NOT NULL DEFAULT '[]'
            )",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_tasks_table".to_string(),
            cause: e.to_string(),
        })?;

        // Status scans back the task list and status commands
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_created ON tasks(created_at DESC)",
            [],
        );

        Ok(())
    }

    /// Creates a new pending task and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is empty or the insert fails.
    #[instrument(skip(self, description), fields(operation = "create_task", kind))]
    pub fn create(
        &self,
        description: impl Into<String>,
        kind: &str,
        priority: TaskPriority,
    ) -> Result<Task> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(Error::InvalidInput("task description is empty".to_string()));
        }

        let start = Instant::now();
        let mut task = Task::new(description, kind, priority);
        task.push_log("created");

        let result = (|| {
            let conn = acquire_lock(&self.conn);

            #[allow(clippy::cast_possible_wrap)]
            let created_at = task.created_at as i64;
            conn.execute(
                "INSERT INTO tasks (id, description, kind, priority, status, created_at, progress, log)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    task.id.as_str(),
                    task.description,
                    task.kind,
                    task.priority.as_str(),
                    task.status.as_str(),
                    created_at,
                    f64::from(task.progress),
                    serialize_log(&task.log),
                ],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "create_task".to_string(),
                cause: e.to_string(),
            })?;

            Ok(task)
        })();

        self.record_operation_metrics("create", start, if result.is_ok() { "ok" } else { "error" });
        result
    }

    /// Returns the task with the given id, if any.
    pub fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let conn = acquire_lock(&self.conn);
        Self::load(&conn, id)
    }

    /// Returns tasks, most recently created first, optionally filtered by
    /// status.
    pub fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare(
                "SELECT id, description, kind, priority, status, created_at,
                        started_at, completed_at, progress, result, error, log
                 FROM tasks
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY created_at DESC, rowid DESC",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_list_tasks".to_string(),
                cause: e.to_string(),
            })?;

        let rows = stmt
            .query_map(params![status.map(|s| s.as_str())], read_task_row)
            .map_err(|e| Error::OperationFailed {
                operation: "list_tasks".to_string(),
                cause: e.to_string(),
            })?;

        let mut tasks = Vec::new();
        for row in rows {
            let row = row.map_err(|e| Error::OperationFailed {
                operation: "read_task_row".to_string(),
                cause: e.to_string(),
            })?;
            tasks.push(build_task_from_row(row));
        }
        Ok(tasks)
    }

    /// Moves a pending task to `Running`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the task is not pending; the
    /// stored row is left unchanged.
    #[instrument(skip(self), fields(operation = "start_task", task.id = %id.as_str()))]
    pub fn start(&self, id: &TaskId) -> Result<Task> {
        self.transition(id, TaskStatus::Running, "started", |task| {
            task.started_at = Some(current_timestamp());
        })
    }

    /// Moves a running task to `Completed` with a result payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the task is not running; the
    /// stored row is left unchanged.
    #[instrument(skip(self, result), fields(operation = "complete_task", task.id = %id.as_str()))]
    pub fn complete(&self, id: &TaskId, result: impl Into<String>) -> Result<Task> {
        let result = result.into();
        self.transition(id, TaskStatus::Completed, "completed", move |task| {
            task.completed_at = Some(current_timestamp());
            task.set_progress(1.0);
            task.result = Some(result);
        })
    }

    /// Moves a running task to `Failed` with an error message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the task is not running; the
    /// stored row is left unchanged.
    #[instrument(skip(self, error), fields(operation = "fail_task", task.id = %id.as_str()))]
    pub fn fail(&self, id: &TaskId, error: impl Into<String>) -> Result<Task> {
        let error = error.into();
        let message = format!("failed: {error}");
        self.transition(id, TaskStatus::Failed, &message, move |task| {
            task.completed_at = Some(current_timestamp());
            task.error = Some(error);
        })
    }

    /// Cancels a pending or running task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the task is already terminal;
    /// the stored row is left unchanged.
    #[instrument(skip(self), fields(operation = "cancel_task", task.id = %id.as_str()))]
    pub fn cancel(&self, id: &TaskId) -> Result<Task> {
        self.transition(id, TaskStatus::Cancelled, "cancelled", |task| {
            task.completed_at = Some(current_timestamp());
        })
    }

    /// Updates the progress fraction of a live task, clamped to [0.0, 1.0].
    ///
    /// # Errors
    ///
    /// Returns an error if the task is unknown or already terminal.
    pub fn update_progress(&self, id: &TaskId, progress: f32) -> Result<Task> {
        self.modify(id, "update_task_progress", move |task| {
            task.set_progress(progress);
        })
    }

    /// Appends a line to a live task's bounded log.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is unknown or already terminal.
    pub fn append_log(&self, id: &TaskId, message: impl Into<String>) -> Result<Task> {
        let message = message.into();
        self.modify(id, "append_task_log", move |task| {
            task.push_log(message);
        })
    }

    /// Returns the total number of tracked tasks.
    pub fn count(&self) -> Result<u64> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(|e| Error::OperationFailed {
                operation: "count_tasks".to_string(),
                cause: e.to_string(),
            })?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count as u64)
    }

    /// Applies one legal status transition, appending a log entry.
    ///
    /// The legality check happens before any write: a rejected move
    /// returns the error with the row untouched.
    fn transition(
        &self,
        id: &TaskId,
        to: TaskStatus,
        log_message: &str,
        apply: impl FnOnce(&mut Task),
    ) -> Result<Task> {
        let start = Instant::now();
        let result = (|| {
            let mut conn = acquire_lock(&self.conn);
            let tx = conn.transaction().map_err(|e| Error::OperationFailed {
                operation: "begin_task_transition".to_string(),
                cause: e.to_string(),
            })?;

            let mut task = Self::load(&tx, id)?
                .ok_or_else(|| Error::InvalidInput(format!("unknown task: {id}")))?;

            if !task.status.can_transition_to(to) {
                return Err(Error::InvalidTransition {
                    entity: "task".to_string(),
                    from: task.status.as_str().to_string(),
                    to: to.as_str().to_string(),
                });
            }

            let from = task.status;
            task.status = to;
            apply(&mut task);
            task.push_log(log_message);

            Self::persist(&tx, &task)?;
            tx.commit().map_err(|e| Error::OperationFailed {
                operation: "commit_task_transition".to_string(),
                cause: e.to_string(),
            })?;

            tracing::debug!(
                task.id = %task.id,
                from = from.as_str(),
                to = to.as_str(),
                "task transition"
            );
            metrics::counter!("task_transitions_total", "to" => to.as_str()).increment(1);
            Ok(task)
        })();

        self.record_operation_metrics(
            "transition",
            start,
            if result.is_ok() { "ok" } else { "error" },
        );
        result
    }

    /// Applies a non-transition mutation to a live (non-terminal) task.
    fn modify(
        &self,
        id: &TaskId,
        operation: &'static str,
        apply: impl FnOnce(&mut Task),
    ) -> Result<Task> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(|e| Error::OperationFailed {
            operation: operation.to_string(),
            cause: e.to_string(),
        })?;

        let mut task =
            Self::load(&tx, id)?.ok_or_else(|| Error::InvalidInput(format!("unknown task: {id}")))?;

        if task.status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "task {id} is {} and can no longer change",
                task.status
            )));
        }

        apply(&mut task);
        Self::persist(&tx, &task)?;
        tx.commit().map_err(|e| Error::OperationFailed {
            operation: operation.to_string(),
            cause: e.to_string(),
        })?;
        Ok(task)
    }

    fn load(conn: &Connection, id: &TaskId) -> Result<Option<Task>> {
        let row = conn
            .query_row(
                "SELECT id, description, kind, priority, status, created_at,
                        started_at, completed_at, progress, result, error, log
                 FROM tasks WHERE id = ?1",
                params![id.as_str()],
                read_task_row,
            )
            .map(Some)
            .or_else(|e| {
                if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                    Ok(None)
                } else {
                    Err(Error::OperationFailed {
                        operation: "load_task".to_string(),
                        cause: e.to_string(),
                    })
                }
            })?;

        Ok(row.map(build_task_from_row))
    }

    fn persist(conn: &Connection, task: &Task) -> Result<()> {
        #[allow(clippy::cast_possible_wrap)]
        let started_at = task.started_at.map(|t| t as i64);
        #[allow(clippy::cast_possible_wrap)]
        let completed_at = task.completed_at.map(|t| t as i64);

        conn.execute(
            "UPDATE tasks
             SET status = ?2, started_at = ?3, completed_at = ?4,
                 progress = ?5, result = ?6, error = ?7, log = ?8
             WHERE id = ?1",
            params![
                task.id.as_str(),
                task.status.as_str(),
                started_at,
                completed_at,
                f64::from(task.progress),
                task.result,
                task.error,
                serialize_log(&task.log),
            ],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "persist_task".to_string(),
            cause: e.to_string(),
        })?;
        Ok(())
    }

    fn record_operation_metrics(
        &self,
        operation: &'static str,
        start: Instant,
        status: &'static str,
    ) {
        metrics::counter!(
            "storage_operations_total",
            "store" => "tasks",
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "storage_operation_duration_ms",
            "store" => "tasks",
            "operation" => operation,
            "status" => status
        )
        .record(start.elapsed().as_secs_f64() * 1000.0);
    }
}

fn serialize_log(log: &[TaskLogEntry]) -> String {
    serde_json::to_string(log).unwrap_or_else(|_| "[]".to_string())
}

fn read_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        description: row.get(1)?,
        kind: row.get(2)?,
        priority: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        progress: row.get(8)?,
        result: row.get(9)?,
        error: row.get(10)?,
        log: row.get(11)?,
    })
}

fn build_task_from_row(row: TaskRow) -> Task {
    #[allow(clippy::cast_sign_loss)]
    let created_at = row.created_at as u64;
    #[allow(clippy::cast_sign_loss)]
    let started_at = row.started_at.map(|t| t as u64);
    #[allow(clippy::cast_sign_loss)]
    let completed_at = row.completed_at.map(|t| t as u64);
    #[allow(clippy::cast_possible_truncation)]
    let progress = row.progress as f32;

    Task {
        id: TaskId::new(row.id),
        description: row.description,
        kind: row.kind,
        priority: TaskPriority::parse(&row.priority).unwrap_or_default(),
        status: TaskStatus::parse(&row.status).unwrap_or_default(),
        created_at,
        started_at,
        completed_at,
        progress,
        result: row.result,
        error: row.error,
        log: serde_json::from_str(&row.log).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TASK_LOG_CAP;

    fn harness() -> TaskHarness {
        TaskHarness::in_memory().unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let tasks = harness();
        let task = tasks
            .create("index the archive", "maintenance", TaskPriority::Normal)
            .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.log.len(), 1);
        assert_eq!(task.log[0].message, "created");

        let loaded = tasks.get(&task.id).unwrap().unwrap();
        assert_eq!(loaded, task);
    }

    #[test]
    fn test_create_rejects_empty_description() {
        let tasks = harness();
        assert!(tasks.create("   ", "maintenance", TaskPriority::Low).is_err());
    }

    #[test]
    fn test_full_lifecycle_to_completed() {
        let tasks = harness();
        let task = tasks
            .create("summarize thread", "deep-pass", TaskPriority::High)
            .unwrap();

        let running = tasks.start(&task.id).unwrap();
        assert_eq!(running.status, TaskStatus::Running);
        assert!(running.started_at.is_some());

        let done = tasks.complete(&task.id, "42 messages summarized").unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!((done.progress - 1.0).abs() < f32::EPSILON);
        assert_eq!(done.result.as_deref(), Some("42 messages summarized"));

        let messages: Vec<&str> = done.log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["created", "started", "completed"]);
    }

    #[test]
    fn test_complete_without_start_is_rejected() {
        let tasks = harness();
        let task = tasks.create("premature", "test", TaskPriority::Normal).unwrap();

        let err = tasks.complete(&task.id, "nope").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid task transition: pending -> completed"
        );

        // Row untouched by the rejected move
        let loaded = tasks.get(&task.id).unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert!(loaded.completed_at.is_none());
        assert!(loaded.result.is_none());
        assert_eq!(loaded.log.len(), 1);
    }

    #[test]
    fn test_fail_records_error() {
        let tasks = harness();
        let task = tasks.create("doomed", "download", TaskPriority::Low).unwrap();
        tasks.start(&task.id).unwrap();

        let failed = tasks.fail(&task.id, "connection reset").unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("connection reset"));
        assert_eq!(
            failed.log.last().map(|e| e.message.as_str()),
            Some("failed: connection reset")
        );
    }

    #[test]
    fn test_cancel_from_pending_and_running() {
        let tasks = harness();

        let pending = tasks.create("never starts", "test", TaskPriority::Low).unwrap();
        let cancelled = tasks.cancel(&pending.id).unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        let running = tasks.create("interrupted", "test", TaskPriority::Low).unwrap();
        tasks.start(&running.id).unwrap();
        assert_eq!(
            tasks.cancel(&running.id).unwrap().status,
            TaskStatus::Cancelled
        );
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        let tasks = harness();
        let task = tasks.create("finished", "test", TaskPriority::Normal).unwrap();
        tasks.start(&task.id).unwrap();
        tasks.complete(&task.id, "done").unwrap();

        assert!(tasks.start(&task.id).is_err());
        assert!(tasks.cancel(&task.id).is_err());
        assert!(tasks.fail(&task.id, "late").is_err());

        let err = tasks.start(&task.id).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_update_progress_clamps_and_persists() {
        let tasks = harness();
        let task = tasks.create("slow burn", "test", TaskPriority::Normal).unwrap();
        tasks.start(&task.id).unwrap();

        let updated = tasks.update_progress(&task.id, 0.4).unwrap();
        assert!((updated.progress - 0.4).abs() < 1e-6);

        let clamped = tasks.update_progress(&task.id, 2.5).unwrap();
        assert!((clamped.progress - 1.0).abs() < f32::EPSILON);

        tasks.complete(&task.id, "done").unwrap();
        assert!(tasks.update_progress(&task.id, 0.5).is_err());
    }

    #[test]
    fn test_append_log_respects_cap() {
        let tasks = harness();
        let task = tasks.create("chatty", "test", TaskPriority::Normal).unwrap();
        tasks.start(&task.id).unwrap();

        for i in 0..(TASK_LOG_CAP + 5) {
            tasks.append_log(&task.id, format!("tick {i}")).unwrap();
        }

        let loaded = tasks.get(&task.id).unwrap().unwrap();
        assert_eq!(loaded.log.len(), TASK_LOG_CAP);
        assert_eq!(
            loaded.log.last().map(|e| e.message.as_str()),
            Some(format!("tick {}", TASK_LOG_CAP + 4).as_str())
        );
    }

    #[test]
    fn test_list_filters_by_status() {
        let tasks = harness();
        let a = tasks.create("one", "test", TaskPriority::Normal).unwrap();
        let b = tasks.create("two", "test", TaskPriority::Normal).unwrap();
        tasks.start(&b.id).unwrap();

        let pending = tasks.list(Some(TaskStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        let all = tasks.list(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(tasks.count().unwrap(), 2);
    }

    #[test]
    fn test_unknown_task_id() {
        let tasks = harness();
        let missing = TaskId::from("task_missing");
        assert!(tasks.get(&missing).unwrap().is_none());
        assert!(matches!(
            tasks.start(&missing).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn test_on_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let id = {
            let tasks = TaskHarness::new(&path).unwrap();
            let task = tasks.create("persisted", "test", TaskPriority::High).unwrap();
            tasks.start(&task.id).unwrap();
            task.id
        };

        let reopened = TaskHarness::new(&path).unwrap();
        let loaded = reopened.get(&id).unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Running);
        assert_eq!(loaded.priority, TaskPriority::High);
        assert_eq!(loaded.log.len(), 2);
    }
}
