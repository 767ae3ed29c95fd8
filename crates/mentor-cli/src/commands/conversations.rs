use std::io::Write;

use async_trait::async_trait;
use eyre::Result;
use url::Url;

use super::Command;
use crate::{build_backend, resolve_token};

pub struct ConversationsCommand {
    pub api_url: Option<Url>,
    pub token: Option<String>,
}

#[async_trait]
impl Command for ConversationsCommand {
    async fn execute(&self) -> Result<()> {
        let backend = build_backend(self.api_url.clone())?;
        let token = resolve_token(self.token.clone())?;
        let listing = backend.list_conversations(&token).await?;

        let mut stdout = std::io::stdout();
        if listing.is_empty() {
            writeln!(stdout, "No conversations yet.")?;
            return Ok(());
        }
        for conversation in listing {
            let snippet = conversation
                .last_message_snippet
                .as_deref()
                .unwrap_or("(no messages)");
            writeln!(
                stdout,
                "{:>6}  {}  {}",
                conversation.id,
                conversation.updated_at.format("%Y-%m-%d %H:%M"),
                snippet
            )?;
        }
        Ok(())
    }
}
