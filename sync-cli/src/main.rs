//! # lpsync
//!
//! CLI tool for exercising the lpsync long-poll sync session.
//!
//! ## Commands
//!
//! - `decode`: Decode one positional wire event
//! - `replay`: Run a full session against a scripted transcript
//! - `state`: Show or reset the persisted resume point
//!
//! ## Example
//!
//! ```bash
//! # What does this event mean?
//! lpsync decode '[4, 1, 0, 55, 1000, "", "hi"]'
//!
//! # Catch up and poll against recorded responses
//! lpsync replay transcript.json --user-id 42
//!
//! # Where will the next run continue from?
//! lpsync state
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{decode, replay, state};
use config::CliConfig;

/// CLI tool for exercising the lpsync long-poll sync session.
#[derive(Parser, Debug)]
#[command(name = "lpsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the config file and the resume point
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: lpsync.toml in the data directory, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode one wire event given as a JSON array
    Decode {
        /// The event, e.g. '[4, 1, 0, 55, 1000, "", "hi"]'
        event: String,
    },

    /// Run a session against a scripted transcript
    Replay {
        /// Transcript file (JSON)
        transcript: PathBuf,

        /// User the session runs as
        #[arg(long, default_value = "1")]
        user_id: i64,

        /// Run without the messages permission (the session will refuse)
        #[arg(long)]
        no_messages_permission: bool,

        /// Ignore the persisted resume point
        #[arg(long)]
        fresh: bool,
    },

    /// Show the persisted resume point
    State {
        /// Delete the resume point instead
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Decode { event } = &cli.command {
        return decode::run(event);
    }

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    match cli.command {
        Commands::Decode { .. } => {}
        Commands::Replay {
            transcript,
            user_id,
            no_messages_permission,
            fresh,
        } => {
            let config = CliConfig::load(cli.config.as_deref(), &data_dir)?;
            let options = replay::ReplayOptions {
                user_id,
                messages_permission: !no_messages_permission,
                fresh,
            };
            replay::run(&data_dir, &transcript, config.session_config(), &options).await?;
        }
        Commands::State { reset } => {
            state::run(&data_dir, reset).await?;
        }
    }

    Ok(())
}

/// Install the stderr log subscriber.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for lpsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ydun", "lpsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
