//! The chat session state machine.
//!
//! One `ChatSession` owns the conversation listing, the visible message
//! timeline, and the lifecycle of a submission: Idle -> Sending ->
//! Streaming -> Reconciling -> Idle, with a side exit through Failed when
//! the answer stream dies. All store mutation happens here; front-ends read
//! snapshots and listen on the event channel.
//!
//! Lock guards are never held across an await, so navigation (switching
//! conversations, starting a new chat) interleaves freely with an in-flight
//! exchange. Every deferred write carries the conversation it targets and
//! re-checks the selection before committing, which is what keeps a slow
//! reconciliation from clobbering a chat the user has already left.

use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::api::{
    AnswerEvent, ApiError, AskRequest, ConversationRecord, Sender, TutorBackend,
    decode_answer_stream,
};
use crate::auth::BearerToken;
use crate::session::conversations::ConversationStore;
use crate::session::event::{NoticeSeverity, Phase, SessionEvent};
use crate::session::messages::{ChatMessage, LocalMessageId, MessageStore, PendingMessage};

/// Failures surfaced by session operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The question was empty or whitespace. Nothing was sent.
    #[error("Question is empty")]
    EmptyQuestion,

    /// No credential was supplied. Nothing was sent.
    #[error("Not signed in")]
    MissingCredentials,

    /// A submission is already in Sending or Streaming.
    #[error("An exchange is already in flight")]
    ExchangeInFlight,

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The backend reported a generation failure inside the stream.
    #[error("Tutor failed to answer: {message}")]
    Generation { message: String },
}

struct SessionState {
    conversations: ConversationStore,
    messages: MessageStore,
    phase: Phase,
}

/// Cloneable handle to one student's chat session.
#[derive(Clone)]
pub struct ChatSession {
    backend: Arc<dyn TutorBackend>,
    state: Arc<Mutex<SessionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChatSession {
    /// Create a session over the given backend. The returned receiver sees
    /// every `SessionEvent` the session emits; dropping it is harmless.
    pub fn new(backend: Arc<dyn TutorBackend>) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            backend,
            state: Arc::new(Mutex::new(SessionState {
                conversations: ConversationStore::new(),
                messages: MessageStore::new(),
                phase: Phase::Idle,
            })),
            events,
        };
        (session, receiver)
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    pub async fn conversations(&self) -> Vec<ConversationRecord> {
        self.state.lock().await.conversations.list().to_vec()
    }

    pub async fn selected_conversation(&self) -> Option<i64> {
        self.state.lock().await.conversations.selected()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.messages.list().to_vec()
    }

    /// Re-fetch the conversation listing.
    pub async fn refresh_conversations(
        &self,
        token: Option<&BearerToken>,
    ) -> Result<(), ChatError> {
        let token = token.ok_or(ChatError::MissingCredentials)?;
        let listing = self.backend.list_conversations(token).await?;
        self.state.lock().await.conversations.replace_all(listing);
        Ok(())
    }

    /// Start a new chat: deselect and empty the timeline. Takes effect
    /// immediately, independent of any exchange still in flight; the
    /// exchange's deferred writes will find the selection changed and stay
    /// away from the timeline.
    pub async fn new_chat(&self) {
        let mut state = self.state.lock().await;
        state.conversations.select(None);
        state.messages.clear();
    }

    /// Switch to an existing conversation and load its history. The switch
    /// itself is synchronous; the history lands only if the selection is
    /// unchanged once the fetch resolves.
    pub async fn select_conversation(
        &self,
        token: Option<&BearerToken>,
        conversation_id: i64,
    ) -> Result<(), ChatError> {
        let token = token.ok_or(ChatError::MissingCredentials)?;
        {
            let mut state = self.state.lock().await;
            state.conversations.select(Some(conversation_id));
            state.messages.clear();
        }

        let history = self
            .backend
            .conversation_messages(token, conversation_id)
            .await?;

        let mut state = self.state.lock().await;
        if state.conversations.selected() == Some(conversation_id) {
            state.messages.replace_all(history);
        } else {
            debug!(
                target: "mentor::session",
                "Dropping stale history for conversation {conversation_id}"
            );
        }
        Ok(())
    }

    /// Submit a question and drive the exchange to completion.
    ///
    /// Returns once reconciliation has run (success) or cleanup has run
    /// (failure); streamed answer fragments are observable through the
    /// event channel and snapshots while this is in progress.
    pub async fn submit(
        &self,
        token: Option<&BearerToken>,
        question: &str,
    ) -> Result<(), ChatError> {
        let token = token.ok_or(ChatError::MissingCredentials)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let (origin, student_id) = {
            let mut state = self.state.lock().await;
            if state.phase != Phase::Idle {
                return Err(ChatError::ExchangeInFlight);
            }
            state.phase = Phase::Sending;
            let origin = state.conversations.selected();
            let student_id = state
                .messages
                .append_pending(PendingMessage::new(Sender::Student, question, origin));
            (origin, student_id)
        };

        let result = self.run_exchange(token, question, origin, &student_id).await;

        self.state.lock().await.phase = Phase::Idle;
        result
    }

    async fn run_exchange(
        &self,
        token: &BearerToken,
        question: &str,
        origin: Option<i64>,
        student_id: &LocalMessageId,
    ) -> Result<(), ChatError> {
        let request = AskRequest {
            question: question.to_string(),
            conversation_id: origin,
        };

        let byte_stream = match self.backend.ask(token, request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_exchange(None, None, &e.to_string()).await;
                return Err(e.into());
            }
        };

        // The answer placeholder appears once the stream is open and grows
        // with each chunk.
        let tutor_id = {
            let mut state = self.state.lock().await;
            state.phase = Phase::Streaming;
            state
                .messages
                .append_pending(PendingMessage::new(Sender::Tutor, "", origin))
        };

        let mut answer_stream = decode_answer_stream(byte_stream);
        let mut assigned: Option<i64> = None;
        let mut adoption: Option<i64> = None;

        while let Some(event) = answer_stream.next().await {
            match event {
                Ok(AnswerEvent::ConversationAssigned { conversation_id }) => {
                    assigned = Some(conversation_id);
                    {
                        let mut state = self.state.lock().await;
                        state.messages.assign_conversation(student_id, conversation_id);
                        state.messages.assign_conversation(&tutor_id, conversation_id);
                        // Follow the backend's assignment unless the user
                        // has navigated somewhere else mid-stream.
                        if state.conversations.selected() == origin {
                            state.conversations.select(Some(conversation_id));
                            adoption = Some(conversation_id);
                        }
                    }
                    let _ = self
                        .events
                        .send(SessionEvent::ConversationAssigned { conversation_id });
                }
                Ok(AnswerEvent::AnswerChunk { text }) => {
                    let delivered = {
                        let mut state = self.state.lock().await;
                        state.messages.push_chunk(&tutor_id, &text)
                    };
                    // The placeholder is gone once the user navigates away;
                    // late chunks are dropped rather than resurrected.
                    if delivered {
                        let _ = self.events.send(SessionEvent::AnswerDelta {
                            local_id: tutor_id.clone(),
                            text,
                        });
                    }
                }
                Ok(AnswerEvent::Error { message }) => {
                    self.fail_exchange(Some(&tutor_id), adoption.map(|id| (origin, id)), &message)
                        .await;
                    return Err(ChatError::Generation { message });
                }
                Err(e) => {
                    let details = e.to_string();
                    self.fail_exchange(Some(&tutor_id), adoption.map(|id| (origin, id)), &details)
                        .await;
                    return Err(e.into());
                }
            }
        }

        self.state.lock().await.phase = Phase::Reconciling;

        let target = assigned.or(origin);
        self.reconcile(token, target).await;

        let _ = self
            .events
            .send(SessionEvent::ExchangeCompleted {
                conversation_id: target,
            });
        Ok(())
    }

    /// Failure cleanup: drop the answer placeholder, undo a conversation
    /// adoption this exchange made, raise the notice. The student's
    /// question stays in the timeline.
    async fn fail_exchange(
        &self,
        tutor_id: Option<&LocalMessageId>,
        revert: Option<(Option<i64>, i64)>,
        message: &str,
    ) {
        {
            let mut state = self.state.lock().await;
            state.phase = Phase::Failed;
            if let Some(local_id) = tutor_id {
                state.messages.remove_pending(local_id);
            }
            if let Some((origin, adopted_id)) = revert {
                if state.conversations.selected() == Some(adopted_id) {
                    state.conversations.select(origin);
                }
            }
        }
        warn!(target: "mentor::session", "Exchange failed: {message}");
        let _ = self.events.send(SessionEvent::Notice {
            severity: NoticeSeverity::Error,
            message: message.to_string(),
        });
    }

    /// Swap optimistic state for backend truth after a clean stream. The
    /// listing refresh always lands; the history refresh is scoped to
    /// `target` and skipped or dropped once the selection has moved on.
    /// Fetch failures degrade to warnings, the streamed answer stays.
    async fn reconcile(&self, token: &BearerToken, target: Option<i64>) {
        match self.backend.list_conversations(token).await {
            Ok(listing) => {
                self.state.lock().await.conversations.replace_all(listing);
            }
            Err(e) => {
                warn!(target: "mentor::session", "Conversation refresh failed after exchange: {e}");
                let _ = self.events.send(SessionEvent::Notice {
                    severity: NoticeSeverity::Warning,
                    message: format!("Could not refresh conversations: {e}"),
                });
            }
        }

        let Some(conversation_id) = target else {
            // Never assigned and nothing selected: there is no history to
            // fetch and no selection to fall back to.
            return;
        };

        if self.state.lock().await.conversations.selected() != Some(conversation_id) {
            debug!(
                target: "mentor::session",
                "Skipping history reconciliation for conversation {conversation_id}: no longer selected"
            );
            return;
        }

        match self
            .backend
            .conversation_messages(token, conversation_id)
            .await
        {
            Ok(history) => {
                let mut state = self.state.lock().await;
                // The selection may have moved while the fetch was in
                // flight.
                if state.conversations.selected() == Some(conversation_id) {
                    state.messages.replace_all(history);
                }
            }
            Err(e) => {
                warn!(target: "mentor::session", "History refresh failed after exchange: {e}");
                let _ = self.events.send(SessionEvent::Notice {
                    severity: NoticeSeverity::Warning,
                    message: format!("Could not refresh messages: {e}"),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ByteStream, MessageRecord};
    use chrono::NaiveDateTime;
    use futures_util::stream;
    use std::collections::VecDeque;
    use tokio::sync::Notify;
    use tokio_util::bytes::Bytes;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum BackendCall {
        ListConversations,
        ConversationMessages(i64),
        Ask { conversation_id: Option<i64> },
    }

    struct HistoryGate {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    /// Scripted backend: every call pops the next queued response.
    #[derive(Default)]
    struct StubBackend {
        answers: Mutex<VecDeque<Result<ByteStream, ApiError>>>,
        listings: Mutex<VecDeque<Result<Vec<ConversationRecord>, ApiError>>>,
        histories: Mutex<VecDeque<Result<Vec<MessageRecord>, ApiError>>>,
        history_gate: Option<HistoryGate>,
        calls: Mutex<Vec<BackendCall>>,
    }

    impl StubBackend {
        async fn calls(&self) -> Vec<BackendCall> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl TutorBackend for StubBackend {
        async fn list_conversations(
            &self,
            _token: &BearerToken,
        ) -> Result<Vec<ConversationRecord>, ApiError> {
            self.calls.lock().await.push(BackendCall::ListConversations);
            self.listings
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn conversation_messages(
            &self,
            _token: &BearerToken,
            conversation_id: i64,
        ) -> Result<Vec<MessageRecord>, ApiError> {
            self.calls
                .lock()
                .await
                .push(BackendCall::ConversationMessages(conversation_id));
            if let Some(gate) = &self.history_gate {
                gate.started.notify_one();
                gate.release.notified().await;
            }
            self.histories
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn ask(
            &self,
            _token: &BearerToken,
            request: AskRequest,
        ) -> Result<ByteStream, ApiError> {
            self.calls.lock().await.push(BackendCall::Ask {
                conversation_id: request.conversation_id,
            });
            match self.answers.lock().await.pop_front() {
                Some(response) => response,
                None => Err(ApiError::Unknown {
                    status_code: 0,
                    details: "no scripted answer".to_string(),
                }),
            }
        }
    }

    fn token() -> BearerToken {
        BearerToken::new("test-token")
    }

    fn byte_stream(chunks: &[&str]) -> ByteStream {
        let chunks: Vec<Result<Bytes, ApiError>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    fn conversation(id: i64) -> ConversationRecord {
        ConversationRecord {
            id,
            student_id: 7,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
            last_message_snippet: None,
        }
    }

    fn message(id: i64, conversation_id: i64, sender: Sender, content: &str) -> MessageRecord {
        MessageRecord {
            id,
            conversation_id,
            sender,
            content: content.to_string(),
            created_at: NaiveDateTime::default(),
        }
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn gravity_history() -> Vec<MessageRecord> {
        vec![
            message(101, 42, Sender::Student, "What is gravity?"),
            message(102, 42, Sender::Tutor, "Gravity is a force."),
        ]
    }

    #[tokio::test]
    async fn test_submit_streams_answer_and_reconciles() {
        let stub = Arc::new(StubBackend::default());
        stub.answers.lock().await.push_back(Ok(byte_stream(&[
            "{\"conversation_id\": 42}\n{\"message_chunk\": \"Gravity \"}\n",
            "{\"message_chunk\": \"is a force.\"}\n",
        ])));
        stub.listings
            .lock()
            .await
            .push_back(Ok(vec![conversation(42)]));
        stub.histories.lock().await.push_back(Ok(gravity_history()));

        let (session, mut receiver) = ChatSession::new(stub.clone());
        session
            .submit(Some(&token()), "What is gravity?")
            .await
            .unwrap();

        assert_eq!(session.selected_conversation().await, Some(42));
        assert_eq!(session.phase().await, Phase::Idle);

        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| !m.is_pending()));
        assert_eq!(messages[1].sender(), Sender::Tutor);
        assert_eq!(messages[1].content(), "Gravity is a force.");

        let listing = session.conversations().await;
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].id, 42);

        assert_eq!(
            stub.calls().await,
            vec![
                BackendCall::Ask {
                    conversation_id: None
                },
                BackendCall::ListConversations,
                BackendCall::ConversationMessages(42),
            ]
        );

        let events = drain(&mut receiver);
        assert!(matches!(
            events[0],
            SessionEvent::ConversationAssigned {
                conversation_id: 42
            }
        ));
        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::AnswerDelta { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "Gravity is a force.");
        assert!(matches!(
            events.last(),
            Some(SessionEvent::ExchangeCompleted {
                conversation_id: Some(42)
            })
        ));
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_question_and_reverts_selection() {
        let stub = Arc::new(StubBackend::default());
        // The error record arrives without a trailing newline, as the
        // backend emits it.
        stub.answers.lock().await.push_back(Ok(byte_stream(&[
            "{\"conversation_id\": 42}\n{\"message_chunk\": \"Grav\"}\n",
            "{\"error\": \"Failed to get an answer from the RAG system.\"}",
        ])));

        let (session, mut receiver) = ChatSession::new(stub.clone());
        let result = session.submit(Some(&token()), "What is gravity?").await;

        match result {
            Err(ChatError::Generation { message }) => {
                assert_eq!(message, "Failed to get an answer from the RAG system.");
            }
            other => panic!("Expected generation failure, got {other:?}"),
        }

        // Placeholder retracted, question kept, selection back where it
        // started.
        let messages = session.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender(), Sender::Student);
        assert_eq!(messages[0].content(), "What is gravity?");
        assert!(messages[0].is_pending());
        assert_eq!(session.selected_conversation().await, None);
        assert_eq!(session.phase().await, Phase::Idle);

        // No reconciliation after a failed exchange.
        assert_eq!(
            stub.calls().await,
            vec![BackendCall::Ask {
                conversation_id: None
            }]
        );

        let events = drain(&mut receiver);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Notice {
                severity: NoticeSeverity::Error,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_submit_without_token_sends_nothing() {
        let stub = Arc::new(StubBackend::default());
        let (session, _receiver) = ChatSession::new(stub.clone());

        let result = session.submit(None, "What is gravity?").await;

        assert!(matches!(result, Err(ChatError::MissingCredentials)));
        assert!(session.messages().await.is_empty());
        assert!(stub.calls().await.is_empty());
        assert_eq!(session.phase().await, Phase::Idle);
    }

    #[tokio::test]
    async fn test_submit_blank_question_sends_nothing() {
        let stub = Arc::new(StubBackend::default());
        let (session, _receiver) = ChatSession::new(stub.clone());

        let result = session.submit(Some(&token()), "   \n\t").await;

        assert!(matches!(result, Err(ChatError::EmptyQuestion)));
        assert!(session.messages().await.is_empty());
        assert!(stub.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_stream_without_assignment_leaves_selection_unset() {
        let stub = Arc::new(StubBackend::default());
        stub.answers
            .lock()
            .await
            .push_back(Ok(byte_stream(&["{\"message_chunk\": \"orphan\"}\n"])));

        let (session, mut receiver) = ChatSession::new(stub.clone());
        session.submit(Some(&token()), "hello?").await.unwrap();

        assert_eq!(session.selected_conversation().await, None);

        // The listing refresh is global and still runs; there is no
        // conversation to fetch history for.
        assert_eq!(
            stub.calls().await,
            vec![
                BackendCall::Ask {
                    conversation_id: None
                },
                BackendCall::ListConversations,
            ]
        );

        // The streamed answer stays, optimistic, with nothing to confirm
        // it against.
        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content(), "orphan");
        assert!(messages[1].is_pending());

        let events = drain(&mut receiver);
        assert!(matches!(
            events.last(),
            Some(SessionEvent::ExchangeCompleted {
                conversation_id: None
            })
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_before_stream_keeps_question() {
        let stub = Arc::new(StubBackend::default());
        stub.answers.lock().await.push_back(Err(ApiError::Server {
            status_code: 502,
            details: "upstream unavailable".to_string(),
        }));

        let (session, mut receiver) = ChatSession::new(stub.clone());
        let result = session.submit(Some(&token()), "What is gravity?").await;

        assert!(matches!(result, Err(ChatError::Api(ApiError::Server { .. }))));

        let messages = session.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender(), Sender::Student);
        assert_eq!(session.phase().await, Phase::Idle);

        let events = drain(&mut receiver);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Notice {
                severity: NoticeSeverity::Error,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_mid_stream_transport_failure_cleans_up() {
        let stub = Arc::new(StubBackend::default());
        let failing: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from(
                "{\"conversation_id\": 7}\n{\"message_chunk\": \"partial\"}\n",
            )),
            Err(ApiError::Stream {
                details: "connection reset".to_string(),
            }),
        ]));
        stub.answers.lock().await.push_back(Ok(failing));

        let (session, _receiver) = ChatSession::new(stub.clone());
        let result = session.submit(Some(&token()), "hello?").await;

        assert!(matches!(
            result,
            Err(ChatError::Api(ApiError::Stream { .. }))
        ));

        let messages = session.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender(), Sender::Student);
        // Adoption of conversation 7 was undone.
        assert_eq!(session.selected_conversation().await, None);
    }

    #[tokio::test]
    async fn test_reconciliation_failure_keeps_streamed_answer() {
        let stub = Arc::new(StubBackend::default());
        stub.answers.lock().await.push_back(Ok(byte_stream(&[
            "{\"conversation_id\": 42}\n",
            "{\"message_chunk\": \"Gravity \"}\n{\"message_chunk\": \"is a force.\"}\n",
        ])));
        stub.listings.lock().await.push_back(Err(ApiError::Server {
            status_code: 500,
            details: "listing down".to_string(),
        }));
        stub.histories.lock().await.push_back(Err(ApiError::Server {
            status_code: 500,
            details: "history down".to_string(),
        }));

        let (session, mut receiver) = ChatSession::new(stub.clone());
        session
            .submit(Some(&token()), "What is gravity?")
            .await
            .unwrap();

        // Optimistic content survives; its text is the chunk concatenation
        // in arrival order.
        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert!(messages[1].is_pending());
        assert_eq!(messages[1].content(), "Gravity is a force.");
        assert_eq!(session.selected_conversation().await, Some(42));

        let events = drain(&mut receiver);
        let warnings = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SessionEvent::Notice {
                        severity: NoticeSeverity::Warning,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(warnings, 2);
        assert!(matches!(
            events.last(),
            Some(SessionEvent::ExchangeCompleted {
                conversation_id: Some(42)
            })
        ));
    }

    #[tokio::test]
    async fn test_new_chat_mid_stream_clears_now_and_suppresses_reconciliation() {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let gated: ByteStream = {
            let reached = reached.clone();
            let release = release.clone();
            Box::pin(async_stream::stream! {
                yield Ok(Bytes::from(
                    "{\"conversation_id\": 42}\n{\"message_chunk\": \"Gravity \"}\n",
                ));
                reached.notify_one();
                release.notified().await;
                yield Ok(Bytes::from("{\"message_chunk\": \"is a force.\"}\n"));
            })
        };

        let stub = Arc::new(StubBackend::default());
        stub.answers.lock().await.push_back(Ok(gated));
        stub.listings
            .lock()
            .await
            .push_back(Ok(vec![conversation(42)]));
        stub.histories.lock().await.push_back(Ok(gravity_history()));

        let (session, _receiver) = ChatSession::new(stub.clone());
        let submit_handle = tokio::spawn({
            let session = session.clone();
            async move { session.submit(Some(&token()), "What is gravity?").await }
        });

        reached.notified().await;

        // Mid-stream: assignment adopted, first fragment visible.
        assert_eq!(session.phase().await, Phase::Streaming);
        assert_eq!(session.selected_conversation().await, Some(42));
        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content(), "Gravity ");

        // Submission is exclusive while one is in flight.
        let second = session.submit(Some(&token()), "another question").await;
        assert!(matches!(second, Err(ChatError::ExchangeInFlight)));

        // The reset takes effect without waiting for the stream.
        session.new_chat().await;
        assert!(session.messages().await.is_empty());
        assert_eq!(session.selected_conversation().await, None);

        release.notify_one();
        submit_handle.await.unwrap().unwrap();

        // Late chunks did not resurrect the timeline and the history
        // refresh for the abandoned conversation was skipped.
        assert!(session.messages().await.is_empty());
        assert_eq!(session.selected_conversation().await, None);
        assert_eq!(
            stub.calls().await,
            vec![
                BackendCall::Ask {
                    conversation_id: None
                },
                BackendCall::ListConversations,
            ]
        );
        // The listing refresh still landed.
        assert_eq!(session.conversations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_navigation_is_not_hijacked_by_assignment() {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let gated: ByteStream = {
            let reached = reached.clone();
            let release = release.clone();
            Box::pin(async_stream::stream! {
                reached.notify_one();
                release.notified().await;
                yield Ok(Bytes::from(
                    "{\"conversation_id\": 42}\n{\"message_chunk\": \"late answer\"}\n",
                ));
            })
        };

        let stub = Arc::new(StubBackend::default());
        stub.answers.lock().await.push_back(Ok(gated));
        stub.histories
            .lock()
            .await
            .push_back(Ok(vec![message(9, 5, Sender::Student, "older question")]));
        stub.listings
            .lock()
            .await
            .push_back(Ok(vec![conversation(42), conversation(5)]));

        let (session, _receiver) = ChatSession::new(stub.clone());
        let submit_handle = tokio::spawn({
            let session = session.clone();
            async move { session.submit(Some(&token()), "What is gravity?").await }
        });

        reached.notified().await;

        // The user walks over to an older conversation while the answer is
        // still pending.
        session
            .select_conversation(Some(&token()), 5)
            .await
            .unwrap();
        assert_eq!(session.selected_conversation().await, Some(5));

        release.notify_one();
        submit_handle.await.unwrap().unwrap();

        // The assignment did not yank the user back, and conversation 5's
        // history was not overwritten by conversation 42's.
        assert_eq!(session.selected_conversation().await, Some(5));
        let messages = session.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content(), "older question");

        assert_eq!(
            stub.calls().await,
            vec![
                BackendCall::Ask {
                    conversation_id: None
                },
                BackendCall::ConversationMessages(5),
                BackendCall::ListConversations,
            ]
        );
    }

    #[tokio::test]
    async fn test_select_conversation_drops_stale_history() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let stub = Arc::new(StubBackend {
            history_gate: Some(HistoryGate {
                started: started.clone(),
                release: release.clone(),
            }),
            ..StubBackend::default()
        });
        stub.histories
            .lock()
            .await
            .push_back(Ok(vec![message(1, 4, Sender::Student, "from four")]));
        stub.histories
            .lock()
            .await
            .push_back(Ok(vec![message(2, 5, Sender::Student, "from five")]));

        let (session, _receiver) = ChatSession::new(stub.clone());

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.select_conversation(Some(&token()), 4).await }
        });
        started.notified().await;

        let second = tokio::spawn({
            let session = session.clone();
            async move { session.select_conversation(Some(&token()), 5).await }
        });
        started.notified().await;

        release.notify_one();
        first.await.unwrap().unwrap();

        release.notify_one();
        second.await.unwrap().unwrap();

        // Only the fetch matching the current selection landed.
        assert_eq!(session.selected_conversation().await, Some(5));
        let messages = session.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content(), "from five");
    }

    #[tokio::test]
    async fn test_refresh_conversations_replaces_listing() {
        let stub = Arc::new(StubBackend::default());
        stub.listings
            .lock()
            .await
            .push_back(Ok(vec![conversation(2), conversation(1)]));

        let (session, _receiver) = ChatSession::new(stub.clone());
        session.refresh_conversations(Some(&token())).await.unwrap();

        let ids: Vec<i64> = session.conversations().await.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 1]);

        let result = session.refresh_conversations(None).await;
        assert!(matches!(result, Err(ChatError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_submit_in_existing_conversation_reuses_its_id() {
        let stub = Arc::new(StubBackend::default());
        stub.histories.lock().await.push_back(Ok(gravity_history()));
        stub.answers.lock().await.push_back(Ok(byte_stream(&[
            "{\"conversation_id\": 42}\n{\"message_chunk\": \"Still a force.\"}\n",
        ])));
        stub.listings
            .lock()
            .await
            .push_back(Ok(vec![conversation(42)]));
        stub.histories.lock().await.push_back(Ok(vec![
            message(101, 42, Sender::Student, "What is gravity?"),
            message(102, 42, Sender::Tutor, "Gravity is a force."),
            message(103, 42, Sender::Student, "And again?"),
            message(104, 42, Sender::Tutor, "Still a force."),
        ]));

        let (session, _receiver) = ChatSession::new(stub.clone());
        session
            .select_conversation(Some(&token()), 42)
            .await
            .unwrap();
        session.submit(Some(&token()), "And again?").await.unwrap();

        assert_eq!(session.selected_conversation().await, Some(42));
        let messages = session.messages().await;
        assert_eq!(messages.len(), 4);
        assert!(messages.iter().all(|m| !m.is_pending()));

        let calls = stub.calls().await;
        assert!(calls.contains(&BackendCall::Ask {
            conversation_id: Some(42)
        }));
    }
}
