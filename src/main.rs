mod cli;
mod config;
mod db;
mod embedding;
mod memory;
mod rerank;
mod server;
mod tokenizer;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hypnos", version, about = "Persistent memory engine for AI agents over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport)
    Serve,
    /// Run sleep-cycle maintenance phases
    Reflect {
        /// Phase to run: decay, tidy, govern, or all
        #[arg(long, default_value = "all")]
        phase: String,
    },
    /// Print store statistics for the bound agent
    Status,
    /// Drop and rebuild the full-text index from current memories
    Reindex,
    /// Embed every memory missing a vector for the configured model
    EmbedMissing,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::HypnosConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve_stdio(config).await?;
        }
        Command::Reflect { phase } => {
            cli::maintenance::reflect(&config, &phase)?;
        }
        Command::Status => {
            cli::stats::status(&config)?;
        }
        Command::Reindex => {
            cli::maintenance::reindex(&config)?;
        }
        Command::EmbedMissing => {
            cli::maintenance::embed_missing(&config).await?;
        }
    }

    Ok(())
}
