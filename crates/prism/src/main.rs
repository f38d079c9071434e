//! Prism CLI - Deduplicated image-variant generation tooling.
//!
//! Prism keeps a durable ledger of generated image variants and makes
//! sure every requested variant is generated exactly once, whether the
//! work happens inline or on queue workers.
//!
//! # Usage
//!
//! ```bash
//! # Generate a variant right now
//! prism generate photos/cat.jpg --fit 400x300
//!
//! # Run a worker draining the action queue
//! prism worker
//!
//! # Inspect ledger and queue state
//! prism status
//!
//! # View configuration
//! prism config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Prism - Deduplicated image-variant generation.
#[derive(Parser, Debug)]
#[command(name = "prism")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate variants for a source image
    Generate(cli::generate::GenerateArgs),

    /// Run a worker draining the action queue
    Worker(cli::worker::WorkerArgs),

    /// Show ledger and queue state
    Status(cli::status::StatusArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't up yet, so a broken config file is reported on
    // stderr directly and the defaults take over.
    let config = match prism_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `prism config path`."
            );
            prism_core::Config::default()
        }
    };
    logging::init(&logging::effective(&config.logging, cli.verbose, cli.json_logs));

    tracing::debug!("Prism v{}", prism_core::VERSION);

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Generate(args) => cli::generate::execute(args, config).await,
        Commands::Worker(args) => cli::worker::execute(args, config).await,
        Commands::Status(args) => cli::status::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
