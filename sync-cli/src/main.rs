//! # driftsync
//!
//! Command-line front end for the driftsync engine.
//!
//! Each device keeps its values and sync bookkeeping in a data directory.
//! Devices sync through a shared remote directory, which makes it easy to
//! try the engine with several "devices" on one machine.
//!
//! ## Commands
//!
//! - `init`: Initialize device identity and remote directory
//! - `set` / `get` / `delete`: Work with local values
//! - `sync`: Run one push/pull cycle
//! - `status`: Show sync status
//! - `pending` / `conflicts`: Inspect the queue and open conflicts
//! - `resolve`: Settle a conflict by hand
//! - `cleanup` / `retry`: Queue maintenance
//!
//! ## Example
//!
//! ```bash
//! # Two devices sharing one remote directory
//! driftsync --data-dir ./laptop init --remote ./shared
//! driftsync --data-dir ./phone init --remote ./shared
//!
//! driftsync --data-dir ./laptop set notes/1 '{"title": "groceries"}'
//! driftsync --data-dir ./laptop sync
//! driftsync --data-dir ./phone sync
//! driftsync --data-dir ./phone get notes/1
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod remote;
mod store;

use commands::{
    cleanup, conflicts, delete, get, init, pending, resolve, retry, set, status, sync, Session,
};

/// Command-line front end for the driftsync engine.
#[derive(Parser, Debug)]
#[command(name = "driftsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for device identity, values and sync state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Remote directory to sync through (overrides the one chosen at init)
    #[arg(long, global = true)]
    remote: Option<PathBuf>,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize device identity
    Init {
        /// Device identifier (random when omitted)
        #[arg(long)]
        device_id: Option<String>,
    },

    /// Write a value and queue it for sync
    Set {
        /// Key to write
        key: String,
        /// Value as JSON (quote strings: '"text"')
        value: String,
    },

    /// Print a value
    Get {
        /// Key to read
        key: String,
    },

    /// Delete a value and queue the deletion
    Delete {
        /// Key to delete
        key: String,
    },

    /// Run one push/pull cycle
    Sync,

    /// Show sync status
    Status,

    /// List entries waiting to be pushed
    Pending,

    /// List conflicts waiting for a value
    Conflicts,

    /// Settle a conflict with a chosen value
    Resolve {
        /// Conflict id (see `conflicts`)
        id: String,
        /// Value as JSON
        #[arg(conflicts_with = "delete", required_unless_present = "delete")]
        value: Option<String>,
        /// Resolve by deleting the key
        #[arg(long)]
        delete: bool,
    },

    /// Drop synced entries and resolved conflicts
    Cleanup,

    /// Requeue entries that ran out of retries
    Retry,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    let session = match &cli.command {
        Commands::Init { device_id } => {
            return init::run(&data_dir, cli.remote.as_deref(), device_id.as_deref()).await;
        }
        _ => Session::open(&data_dir, cli.remote.as_deref(), cli.config.as_deref()).await?,
    };

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Set { key, value } => set::run(&session, &key, &value).await?,
        Commands::Get { key } => get::run(&session, &key).await?,
        Commands::Delete { key } => delete::run(&session, &key).await?,
        Commands::Sync => sync::run(&session).await?,
        Commands::Status => status::run(&session).await?,
        Commands::Pending => pending::run(&session).await?,
        Commands::Conflicts => conflicts::run(&session).await?,
        Commands::Resolve { id, value, delete } => {
            let value = if delete { None } else { value };
            resolve::run(&session, &id, value.as_deref()).await?
        }
        Commands::Cleanup => cleanup::run(&session).await?,
        Commands::Retry => retry::run(&session).await?,
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Get the default data directory for driftsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "driftsync", "driftsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
