//! Athena CLI - command-line front end for the Athena classification client.
//!
//! # Usage
//!
//! ```bash
//! # Dry-run the preparation pipeline over a directory
//! athena prepare ./photos/ --output requests.jsonl --format jsonl
//!
//! # Check that credentials work
//! athena token
//!
//! # View configuration
//! athena config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Athena - stream images to the Athena classification service.
#[derive(Parser, Debug)]
#[command(name = "athena")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "ATHENA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run images through the preparation pipeline without sending them
    Prepare(cli::prepare::PrepareArgs),

    /// Acquire an access token to check credentials
    Token(cli::token::TokenArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e:#}\n  \
                 Using default configuration. Check your config file with `athena config path`."
            );
            athena_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Athena v{}", athena_core::VERSION);

    match cli.command {
        Commands::Prepare(args) => cli::prepare::execute(args, config).await,
        Commands::Token(args) => cli::token::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, cli.config.as_deref()).await,
    }
}
