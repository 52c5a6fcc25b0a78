//! Durable fact projection of conversation records.

use super::{ConversationRecord, RecordId};
use serde::{Deserialize, Serialize};

/// An append-only fact row for the durable store.
///
/// Facts are a projection of selected [`ConversationRecord`]s: three required
/// fields plus a weak back-reference to the originating record. They are never
/// updated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Creation timestamp (Unix epoch seconds).
    pub timestamp: u64,
    /// Free-form category tag (the originating record's role label).
    pub category: String,
    /// The fact text.
    pub fact: String,
    /// Back-reference to the originating record, for lookup only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<RecordId>,
}

impl Fact {
    /// Projects a conversation record into its durable fact shape.
    #[must_use]
    pub fn from_record(record: &ConversationRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            category: record.role.as_str().to_string(),
            fact: record.content.clone(),
            source_id: Some(record.id.clone()),
        }
    }
}
