//! Visible message timeline for the selected conversation.
//!
//! Entries are either `Confirmed` (fetched from the backend) or `Pending`
//! (rendered optimistically while an exchange is in flight). Pending entries
//! carry a session-local id; backend ids are never invented client-side.

use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

use crate::api::{MessageRecord, Sender};

/// Session-local identifier for an optimistic message. Time-ordered and
/// unique within the process; meaningless to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalMessageId(String);

impl LocalMessageId {
    pub fn generate() -> Self {
        Self(format!("msg_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocalMessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message shown before the backend has confirmed it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub local_id: LocalMessageId,
    /// Unknown until the stream reports which conversation the exchange
    /// landed in.
    pub conversation_id: Option<i64>,
    pub sender: Sender,
    pub content: String,
    pub created_at: NaiveDateTime,
}

impl PendingMessage {
    pub fn new(sender: Sender, content: impl Into<String>, conversation_id: Option<i64>) -> Self {
        Self {
            local_id: LocalMessageId::generate(),
            conversation_id,
            sender,
            content: content.into(),
            created_at: Utc::now().naive_utc(),
        }
    }
}

/// One entry of the visible timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    Confirmed(MessageRecord),
    Pending(PendingMessage),
}

impl ChatMessage {
    pub fn sender(&self) -> Sender {
        match self {
            ChatMessage::Confirmed(record) => record.sender,
            ChatMessage::Pending(pending) => pending.sender,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ChatMessage::Confirmed(record) => &record.content,
            ChatMessage::Pending(pending) => &pending.content,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ChatMessage::Pending(_))
    }
}

/// Append-only timeline; an authoritative fetch replaces it wholesale.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    items: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[ChatMessage] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Overwrite the timeline with backend truth. Any optimistic entries
    /// still present are dropped; the fetch supersedes them.
    pub fn replace_all(&mut self, records: Vec<MessageRecord>) {
        self.items = records.into_iter().map(ChatMessage::Confirmed).collect();
    }

    pub fn append_pending(&mut self, message: PendingMessage) -> LocalMessageId {
        let local_id = message.local_id.clone();
        self.items.push(ChatMessage::Pending(message));
        local_id
    }

    /// Grow a pending message's content in place. Returns false when the
    /// entry no longer exists (cleared by a conversation switch).
    pub fn push_chunk(&mut self, local_id: &LocalMessageId, text: &str) -> bool {
        match self.find_pending(local_id) {
            Some(pending) => {
                pending.content.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Record which conversation a pending message belongs to once the
    /// stream reports it.
    pub fn assign_conversation(&mut self, local_id: &LocalMessageId, conversation_id: i64) -> bool {
        match self.find_pending(local_id) {
            Some(pending) => {
                pending.conversation_id = Some(conversation_id);
                true
            }
            None => false,
        }
    }

    /// Retract a pending message, e.g. a tutor placeholder after a failed
    /// stream. Confirmed entries are never removed this way.
    pub fn remove_pending(&mut self, local_id: &LocalMessageId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| match item {
            ChatMessage::Pending(pending) => &pending.local_id != local_id,
            ChatMessage::Confirmed(_) => true,
        });
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn find_pending(&mut self, local_id: &LocalMessageId) -> Option<&mut PendingMessage> {
        self.items.iter_mut().find_map(|item| match item {
            ChatMessage::Pending(pending) if &pending.local_id == local_id => Some(pending),
            _ => None,
        })
    }
}
