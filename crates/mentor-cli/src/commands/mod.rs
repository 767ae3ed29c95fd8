use async_trait::async_trait;
use eyre::Result;

pub mod ask;
pub mod conversations;
pub mod history;

#[async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
