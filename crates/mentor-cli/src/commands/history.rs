use std::io::Write;

use async_trait::async_trait;
use eyre::Result;
use url::Url;

use super::Command;
use crate::{build_backend, resolve_token};

pub struct HistoryCommand {
    pub api_url: Option<Url>,
    pub token: Option<String>,
    pub id: i64,
}

#[async_trait]
impl Command for HistoryCommand {
    async fn execute(&self) -> Result<()> {
        let backend = build_backend(self.api_url.clone())?;
        let token = resolve_token(self.token.clone())?;
        let messages = backend.conversation_messages(&token, self.id).await?;

        let mut stdout = std::io::stdout();
        for message in messages {
            writeln!(
                stdout,
                "{} [{}] {}",
                message.created_at.format("%Y-%m-%d %H:%M"),
                message.sender,
                message.content
            )?;
        }
        Ok(())
    }
}
