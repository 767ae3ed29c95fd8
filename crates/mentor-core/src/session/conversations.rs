//! Conversation listing and selection state.

use crate::api::ConversationRecord;

/// The student's conversations plus which one is on screen.
///
/// `selected == None` means a new chat: no conversation entity exists yet
/// and the backend will create one on the next submission. The listing is
/// kept exactly as the backend returned it (most recently updated first);
/// nothing here re-sorts or merges.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    items: Vec<ConversationRecord>,
    selected: Option<i64>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[ConversationRecord] {
        &self.items
    }

    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn select(&mut self, conversation_id: Option<i64>) {
        self.selected = conversation_id;
    }

    /// Replace the listing wholesale with an authoritative fetch.
    pub fn replace_all(&mut self, items: Vec<ConversationRecord>) {
        self.items = items;
    }
}
