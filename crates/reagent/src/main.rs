//! reagent - a bounded reason-act agent for the terminal

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    batch_command, chat_command, history_command, init_command, status_command, tools_command,
};

/// reagent - tool-using agent with conversation memory
#[derive(Parser)]
#[command(name = "reagent")]
#[command(about = "◆ A bounded reason-act agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and data directories
    Init,
    /// Chat with the agent
    Chat {
        /// Message to send; starts an interactive session when omitted
        #[arg(short, long)]
        message: Option<String>,
        /// Conversation ID (defaults to <agent>_<user>)
        #[arg(short, long)]
        conversation: Option<String>,
        /// User ID (defaults to the configured user)
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Run every line of a file through the agent
    Batch {
        /// File with one input per line
        file: PathBuf,
        /// Conversation ID (defaults to <agent>_<user>)
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// Show stored turns of a conversation
    History {
        /// Conversation ID (defaults to <agent>_<user>)
        #[arg(short, long)]
        conversation: Option<String>,
        /// Only the most recent turns
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// List enabled tools
    Tools,
    /// Show system status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (label, result) = match cli.command {
        Commands::Init => ("Init", init_command().await),
        Commands::Chat {
            message,
            conversation,
            user,
        } => ("Chat", chat_command(message, conversation, user).await),
        Commands::Batch { file, conversation } => {
            ("Batch", batch_command(file, conversation).await)
        }
        Commands::History {
            conversation,
            limit,
        } => ("History", history_command(conversation, limit).await),
        Commands::Tools => ("Tools", tools_command().await),
        Commands::Status => ("Status", status_command().await),
    };

    if let Err(e) = result {
        error!("{} failed: {:#}", label, e);
        std::process::exit(1);
    }
}
