//! Observable session activity for front-ends.

use crate::session::messages::LocalMessageId;

/// Where a submission currently stands. One submission at a time; the
/// session returns to `Idle` after every exchange, successful or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Preconditions passed, request on its way, no answer bytes yet.
    Sending,
    /// Answer records are arriving.
    Streaming,
    /// Stream finished cleanly; authoritative state is being re-fetched.
    Reconciling,
    /// The stream failed; transient, cleanup runs and the session goes
    /// back to `Idle`.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    Warning,
    Error,
}

/// Emitted over the session's event channel as an exchange progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The backend reported which conversation the exchange belongs to.
    ConversationAssigned { conversation_id: i64 },

    /// A fragment of the tutor's answer was appended to the pending
    /// message identified by `local_id`.
    AnswerDelta {
        local_id: LocalMessageId,
        text: String,
    },

    /// The exchange finished and reconciliation ran. `conversation_id` is
    /// the conversation reconciled against: the id the stream reported,
    /// or the one selected at submit time when no report arrived. `None`
    /// when there was neither.
    ExchangeCompleted { conversation_id: Option<i64> },

    /// A user-facing notice. `Warning` for degraded outcomes (e.g. a
    /// failed re-fetch after a successful answer), `Error` for failed
    /// exchanges.
    Notice {
        severity: NoticeSeverity,
        message: String,
    },
}
