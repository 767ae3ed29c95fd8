use clap::{Parser, Subcommand};
use url::Url;

/// Chat with the Mentor tutor from the command line.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Backend base URL (defaults to the local development server)
    #[arg(long, env = "MENTOR_API_URL", global = true)]
    pub api_url: Option<Url>,

    /// Bearer token of the signed-in student
    #[arg(long, env = "MENTOR_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// List your conversations, most recently updated first
    Conversations,
    /// Print the message history of a conversation
    History {
        /// Conversation id, as shown by `mentor conversations`
        id: i64,
    },
    /// Ask the tutor a question and stream the answer
    Ask {
        /// Continue an existing conversation instead of starting a new one
        #[arg(long)]
        conversation: Option<i64>,

        /// The question to send
        #[arg(required = true)]
        question: Vec<String>,
    },
}
