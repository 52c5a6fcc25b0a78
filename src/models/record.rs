//! Conversation record types and identifiers.

use crate::current_timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a conversation record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh time-ordered record ID.
    ///
    /// Uses UUIDv7 so lexicographic id order roughly follows creation
    /// order, which keeps the record table's index friendly to
    /// chronological scans.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The speaker or origin of a conversation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message typed by the user.
    #[default]
    User,
    /// A reply produced by a generative backend.
    Assistant,
    /// System-originated context (errors, notices, injected instructions).
    System,
    /// A durable fact worth keeping beyond the session.
    ///
    /// Knowledge records are the ones projected into the durable fact log;
    /// the other roles stay local unless the synchronizer pushes them.
    Knowledge,
}

impl Role {
    /// Returns all role variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::User, Self::Assistant, Self::System, Self::Knowledge]
    }

    /// Returns the role as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Knowledge => "knowledge",
        }
    }

    /// Parses a role from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "knowledge" => Some(Self::Knowledge),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One conversational or factual unit held by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique identifier.
    pub id: RecordId,
    /// Creation timestamp (Unix epoch seconds).
    pub timestamp: u64,
    /// Who produced this record.
    pub role: Role,
    /// The record content.
    pub content: String,
    /// Extracted topic keywords, deduplicated, insertion order irrelevant.
    pub keywords: Vec<String>,
    /// Optional session grouping key.
    pub session_id: Option<String>,
    /// Whether the record has been pushed to the durable store.
    ///
    /// Starts `false` and is monotonic: once set it is never cleared for
    /// the same id. Only the synchronizer path flips it.
    pub synced: bool,
}

impl ConversationRecord {
    /// Creates a new unsynced record with a generated id and current timestamp.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: RecordId::generate(),
            timestamp: current_timestamp(),
            role,
            content: content.into(),
            keywords: Vec::new(),
            session_id: None,
            synced: false,
        }
    }

    /// Sets the extracted keywords.
    #[must_use]
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Sets the session grouping key.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}
