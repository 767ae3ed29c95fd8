use std::io::Write;

use async_trait::async_trait;
use eyre::Result;
use url::Url;

use mentor_core::session::{ChatSession, NoticeSeverity, SessionEvent};

use super::Command;
use crate::{build_backend, resolve_token};

pub struct AskCommand {
    pub api_url: Option<Url>,
    pub token: Option<String>,
    pub conversation: Option<i64>,
    pub question: String,
}

#[async_trait]
impl Command for AskCommand {
    async fn execute(&self) -> Result<()> {
        let backend = build_backend(self.api_url.clone())?;
        let token = resolve_token(self.token.clone())?;

        let (session, mut events) = ChatSession::new(backend);
        if let Some(conversation_id) = self.conversation {
            session
                .select_conversation(Some(&token), conversation_id)
                .await?;
        }

        // Print answer fragments as they stream in. The task ends when the
        // session is dropped below and the channel closes.
        let printer = tokio::spawn(async move {
            let mut stdout = std::io::stdout();
            let mut assigned = None;
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::AnswerDelta { text, .. } => {
                        let _ = write!(stdout, "{text}");
                        let _ = stdout.flush();
                    }
                    SessionEvent::ConversationAssigned { conversation_id } => {
                        assigned = Some(conversation_id);
                    }
                    SessionEvent::ExchangeCompleted { .. } => {
                        let _ = writeln!(stdout);
                    }
                    SessionEvent::Notice {
                        severity: NoticeSeverity::Warning,
                        message,
                    } => {
                        eprintln!("warning: {message}");
                    }
                    // Failure notices duplicate the error submit returns,
                    // which main reports.
                    SessionEvent::Notice {
                        severity: NoticeSeverity::Error,
                        ..
                    } => {}
                }
            }
            assigned
        });

        let outcome = session.submit(Some(&token), &self.question).await;
        drop(session);
        let assigned = printer.await?;
        outcome?;

        // Tell the student how to pick the thread back up.
        if self.conversation.is_none() {
            if let Some(conversation_id) = assigned {
                eprintln!("conversation {conversation_id}");
            }
        }
        Ok(())
    }
}
