use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use otopazar_cli::cli::{print_json, CliCommand, CliConfig, CommandRunner};
use otopazar_core::tracing_setup::init_tracing;
use otopazar_core::{DataService, RestDataService};

#[derive(Parser)]
#[command(name = "otopazar-cli")]
#[command(about = "Read and send listing messages from the command line")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short, global = true)]
    pretty: bool,

    /// Path to JSON config file (backendUrl, apiKey, userId, ...)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Act as this user id instead of the configured one
    #[arg(long, short = 'u', global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversations, newest first
    Conversations,

    /// Show the thread with a counterpart and mark it read
    Thread {
        /// Counterpart user id
        counterpart: String,
        /// Leave unread messages unread
        #[arg(long)]
        no_mark: bool,
    },

    /// Reply to a counterpart
    Send {
        /// Counterpart user id
        counterpart: String,
        /// Message text
        body: String,
        /// Listing the message is about (defaults to the conversation's)
        #[arg(long, short = 'l')]
        listing: Option<String>,
    },

    /// Message the seller of a listing
    Contact {
        /// Listing id
        listing_id: String,
        /// Message text
        body: String,
    },

    /// Mark all messages from a sender read
    MarkRead {
        /// Sender user id
        sender: String,
    },

    /// Unread and total message counts
    Summary,

    /// Stream inbox events as JSON lines
    Watch {
        /// Open the thread with this counterpart first
        #[arg(long)]
        open: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    init_tracing("otopazar-cli")?;

    let config = CliConfig::resolve(cli.config.as_deref())?;
    let viewer = config.viewer(cli.user)?;
    let service: Arc<dyn DataService> = Arc::new(RestDataService::from_config(&config.core));
    let runner = CommandRunner::new(service, viewer, config.offset()?);

    let command = match cli.command {
        Commands::Conversations => CliCommand::Conversations,
        Commands::Thread {
            counterpart,
            no_mark,
        } => CliCommand::Thread {
            counterpart,
            mark_read: !no_mark,
        },
        Commands::Send {
            counterpart,
            body,
            listing,
        } => CliCommand::Send {
            counterpart,
            body,
            listing_id: listing,
        },
        Commands::Contact { listing_id, body } => CliCommand::Contact { listing_id, body },
        Commands::MarkRead { sender } => CliCommand::MarkRead { sender },
        Commands::Summary => CliCommand::Summary,
        Commands::Watch { open } => return runner.watch(open, cli.pretty).await,
    };

    let response = runner.run(command).await;
    print_json(&response, cli.pretty)?;
    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
