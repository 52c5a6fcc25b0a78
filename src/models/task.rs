//! Long-running task records and their lifecycle states.

use crate::current_timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of log entries retained per task (most recent kept).
pub const TASK_LOG_CAP: usize = 50;

/// Unique identifier for a background task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new task ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh task ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("task_{}", uuid::Uuid::new_v4()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a background task.
///
/// All transitions are one-way; a retried task is a new task. The legal
/// moves are `Pending -> Running`, `Running -> Completed | Failed`, and
/// `Pending | Running -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created but not yet started.
    #[default]
    Pending,
    /// Actively executing.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Abandoned before completion.
    Cancelled,
}

impl TaskStatus {
    /// Returns all status variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Pending,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }

    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true when moving from this status to `target` is legal.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relative scheduling priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Background housekeeping.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// User is waiting on the outcome.
    High,
}

impl TaskPriority {
    /// Returns the priority as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Parses a priority from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One timestamped entry in a task's bounded log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    /// When the entry was appended (Unix epoch seconds).
    pub timestamp: u64,
    /// The log message.
    pub message: String,
}

/// A long-running unit of background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,
    /// Human-readable description.
    pub description: String,
    /// Free-form task kind (e.g. "deep-pass", "download").
    pub kind: String,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// When the task entered `Running`.
    pub started_at: Option<u64>,
    /// When the task reached a terminal state.
    pub completed_at: Option<u64>,
    /// Completion fraction, clamped to [0.0, 1.0].
    pub progress: f32,
    /// Result payload for completed tasks.
    pub result: Option<String>,
    /// Error text for failed tasks.
    pub error: Option<String>,
    /// Bounded log, most recent [`TASK_LOG_CAP`] entries kept.
    pub log: Vec<TaskLogEntry>,
}

impl Task {
    /// Creates a new pending task.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        kind: impl Into<String>,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            description: description.into(),
            kind: kind.into(),
            priority,
            status: TaskStatus::Pending,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
            progress: 0.0,
            result: None,
            error: None,
            log: Vec::new(),
        }
    }

    /// Appends a log entry, evicting the oldest once the cap is reached.
    pub fn push_log(&mut self, message: impl Into<String>) {
        self.log.push(TaskLogEntry {
            timestamp: current_timestamp(),
            message: message.into(),
        });
        if self.log.len() > TASK_LOG_CAP {
            let excess = self.log.len() - TASK_LOG_CAP;
            self.log.drain(..excess);
        }
    }

    /// Sets the progress fraction, clamping into [0.0, 1.0].
    pub fn set_progress(&mut self, progress: f32) {
        self.progress = progress.clamp(0.0, 1.0);
    }
}
