//! Wire types for the tutoring backend's REST surface.
//!
//! Field names and shapes follow the backend's response schemas exactly.
//! Timestamps arrive as ISO 8601 without a UTC offset, so they are kept as
//! `NaiveDateTime` rather than coerced into a timezone the backend never
//! asserted.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Who authored a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    Student,
    Tutor,
}

/// One row of the conversation listing, most recently updated first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: i64,
    pub student_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    /// Server-derived preview of the latest message, absent for empty
    /// conversations.
    #[serde(default)]
    pub last_message_snippet: Option<String>,
}

/// A persisted message fetched from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: Sender,
    pub content: String,
    pub created_at: NaiveDateTime,
}

/// Request body for the streaming ask endpoint. `conversation_id` is `None`
/// when the question starts a new conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub conversation_id: Option<i64>,
}
