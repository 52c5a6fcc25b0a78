//! # Synapt
//!
//! Request routing and tiered memory core for conversational AI agents.
//!
//! Synapt classifies incoming user requests, routes them to an appropriate
//! model tier, dispatches capability handlers, and keeps every conversation
//! turn in a local store that synchronizes to a durable fact log in the
//! background.
//!
//! ## Features
//!
//! - Two-signal request classification (complexity + intent) with rolling
//!   conversation context
//! - Cost-aware routing across ordered model tiers with a parallel deep pass
//!   for complex requests
//! - Three-stage capability dispatch (keyword scan, low-effort model,
//!   high-effort escalation)
//! - Write-through local SQLite store with background synchronization to a
//!   durable fact log
//! - Keyword weight learning from explicit user feedback
//!
//! ## Example
//!
//! ```rust,ignore
//! use synapt::{Agent, CoreConfig};
//!
//! let agent = Agent::new(CoreConfig::default())?;
//! let turn = agent.handle_turn("what's the weather in Lisbon?")?;
//! tracing::info!(tier = %turn.decision.tier, "{}", turn.reply);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
// Cannot be moved to function level.
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod agent;
pub mod classify;
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod observability;
pub mod routing;
pub mod storage;
pub mod sync;
pub mod tasks;
pub mod weights;

// Re-exports for convenience
pub use agent::{Agent, AgentBuilder, AgentStatus, TurnOutcome};
pub use classify::Classifier;
pub use config::CoreConfig;
pub use llm::GenerativeBackend;
pub use models::{
    Classification, Complexity, ConversationRecord, DecisionMethod, Dispatch, EffortLevel, Fact,
    IntentKind, ModelTier, RecordId, Role, RoutingDecision, TaskStatus,
};
pub use routing::{CapabilityHandler, Dispatcher, Router};
pub use storage::{DurableStore, LocalStore};
pub use sync::{SyncStats, Synchronizer};
pub use tasks::TaskHarness;
pub use weights::WeightStore;

/// Error type for synapt operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty request text, malformed JSON, unknown tier or status names |
/// | `OperationFailed` | Database queries fail, HTTP calls fail, I/O errors |
/// | `InvalidTransition` | A task lifecycle move that the state machine forbids |
/// | `Unavailable` | A backend is unreachable or timed out past its deadline |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Request text is empty or whitespace-only
    /// - JSON deserialization fails in a backend response
    /// - An unknown tier, role, or status string is parsed
    /// - Feedback references a keyword that is empty
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - The durable fact log rejects an append
    /// - A generative backend returns a malformed payload
    /// - Filesystem I/O errors occur
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A lifecycle transition was rejected.
    ///
    /// Raised when:
    /// - A task is moved out of a terminal state
    /// - A task skips straight from `Pending` to a terminal result
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        /// The state machine being driven (e.g. "task").
        entity: String,
        /// The state the entity was in.
        from: String,
        /// The state the caller asked for.
        to: String,
    },

    /// A backend is unavailable.
    ///
    /// Raised when:
    /// - A generative backend call exceeds its per-call timeout
    /// - The durable fact log cannot be reached
    /// - A capability handler's upstream service is down
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Returns `true` when the error represents a timeout or unreachable
    /// backend rather than a caller mistake.
    ///
    /// Timeout-shaped failures are treated as low confidence by the dispatch
    /// pipeline instead of aborting the turn.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::OperationFailed { cause, .. } => {
                let lower = cause.to_lowercase();
                lower.contains("timed out") || lower.contains("timeout")
            },
            _ => false,
        }
    }
}

/// Result type alias for synapt operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized utility to avoid duplicate implementations across the
/// codebase. Uses `SystemTime::now()` with fallback to 0 if the system
/// clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use synapt::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0); // Should be a reasonable Unix timestamp
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
