//! # roomsync
//!
//! Command line client for the roomsync protocol.
//!
//! ## Commands
//!
//! - `send`: apply an update to a room, syncing it if the host is reachable
//! - `watch`: follow a room's events live
//! - `rooms`: list locally known rooms
//! - `status`: show per-room sync state
//!
//! ## Example
//!
//! ```bash
//! # Works offline; the update is durable immediately
//! roomsync send notes "buy milk"
//!
//! # Follow a room live against a host
//! roomsync --url ws://sync.example.net:9090 watch notes
//!
//! # Inspect local state
//! roomsync status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod store;

use commands::{rooms, send, status, watch};

/// Command line client for the roomsync protocol.
#[derive(Parser, Debug)]
#[command(name = "roomsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the local room store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Host URL to sync with
    #[arg(long, global = true, default_value = "ws://127.0.0.1:9090")]
    url: String,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply an update to a room
    Send {
        /// Room to update
        room: String,

        /// Update payload (or use --file)
        message: Option<String>,

        /// File whose contents become the payload
        #[arg(long, short, conflicts_with = "message")]
        file: Option<PathBuf>,

        /// Do not try to sync; just persist locally
        #[arg(long)]
        offline: bool,
    },

    /// Follow a room's events live
    Watch {
        /// Room to follow
        room: String,
    },

    /// List locally known rooms
    Rooms,

    /// Show per-room sync state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    match cli.command {
        Commands::Send {
            room,
            message,
            file,
            offline,
        } => {
            let payload = if let Some(msg) = message {
                msg.into_bytes()
            } else if let Some(path) = file {
                tokio::fs::read(&path).await.context("Failed to read file")?
            } else {
                anyhow::bail!("Must specify a message or --file");
            };
            send::run(&data_dir, &cli.url, &room, &payload, offline).await?;
        }
        Commands::Watch { room } => {
            watch::run(&data_dir, &cli.url, &room).await?;
        }
        Commands::Rooms => {
            rooms::run(&data_dir).await?;
        }
        Commands::Status => {
            status::run(&data_dir).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for roomsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "roomsync", "roomsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
