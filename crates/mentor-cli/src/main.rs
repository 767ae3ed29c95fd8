use clap::Parser;
use eyre::Result;

use mentor_cli::cli::{Cli, Commands};
use mentor_cli::commands::Command;
use mentor_cli::commands::ask::AskCommand;
use mentor_cli::commands::conversations::ConversationsCommand;
use mentor_cli::commands::history::HistoryCommand;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Load .env file if present
    mentor_cli::cli::config::load_env()?;

    // Initialize tracing (level configured via RUST_LOG env var)
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Conversations => {
            ConversationsCommand {
                api_url: cli.api_url,
                token: cli.token,
            }
            .execute()
            .await
        }
        Commands::History { id } => {
            HistoryCommand {
                api_url: cli.api_url,
                token: cli.token,
                id,
            }
            .execute()
            .await
        }
        Commands::Ask {
            conversation,
            question,
        } => {
            AskCommand {
                api_url: cli.api_url,
                token: cli.token,
                conversation,
                question: question.join(" "),
            }
            .execute()
            .await
        }
    }
}

/// Logs go to stderr so streamed answers on stdout stay pipeable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
