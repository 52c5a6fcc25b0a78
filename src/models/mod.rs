//! Data models for synapt.
//!
//! This module contains all the core data structures used throughout the system.

mod fact;
mod record;
mod routing;
mod task;

pub use fact::Fact;
pub use record::{ConversationRecord, RecordId, Role};
pub use routing::{
    Classification, Complexity, DecisionMethod, Dispatch, EffortLevel, IntentKind, ModelTier,
    RoutingDecision, ScoredIntent,
};
pub use task::{TASK_LOG_CAP, Task, TaskId, TaskLogEntry, TaskPriority, TaskStatus};
