//! tidemark CLI - the main entry point.
//!
//! Commands:
//! - `onboard` - Write a default config file
//! - `serve`   - Start the HTTP gateway
//! - `ask`     - Run one query through the full pipeline
//! - `doctor`  - Check config and backend reachability

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "tidemark",
    about = "tidemark - climate hazard assistant for Hawaii's sea level rise viewer",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write ~/.tidemark/config.toml with defaults
    Onboard,

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Ask one question and print the JSON response
    Ask {
        /// The question
        query: String,

        /// Session id; reuse it to continue a conversation
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// JSON file with the viewer's map state
        #[arg(short, long)]
        map_state: Option<PathBuf>,
    },

    /// Diagnose configuration and backends
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port, host } => commands::serve::run(port, host).await?,
        Commands::Ask {
            query,
            session,
            map_state,
        } => commands::ask::run(query, session, map_state, cli.verbose).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
