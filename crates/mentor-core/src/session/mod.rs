pub mod controller;
pub mod conversations;
pub mod event;
pub mod messages;

pub use controller::{ChatError, ChatSession};
pub use conversations::ConversationStore;
pub use event::{NoticeSeverity, Phase, SessionEvent};
pub use messages::{ChatMessage, LocalMessageId, MessageStore, PendingMessage};
