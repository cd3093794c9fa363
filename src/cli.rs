//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

/// Shortener - deterministic URL shortener
#[derive(Parser)]
#[command(name = "shortener")]
#[command(version)]
#[command(about = "Shorten, resolve and retire URLs against the configured store", long_about = None)]
pub struct Cli {
    /// Configuration file (default: config.toml when present)
    #[arg(long, short = 'c', global = true, env = "SHORTENER_CONFIG")]
    pub config: Option<String>,

    /// Public base URL used to print full short links
    #[arg(long, global = true, env = "BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Shorten one or more URLs
    Shorten {
        /// Long URLs
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,

        /// Owner id; a fresh visitor id is issued when omitted
        #[arg(long)]
        owner: Option<i64>,
    },

    /// Resolve a short key
    Resolve {
        short_key: String,
    },

    /// List URLs shortened by an owner
    List {
        #[arg(long)]
        owner: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retire short keys owned by an owner
    Retire {
        #[arg(long)]
        owner: i64,

        #[arg(required = true, num_args = 1..)]
        short_keys: Vec<String>,
    },

    /// Validate a visitor token, issuing a new one if it is missing or invalid
    Identify {
        token: Option<String>,
    },

    /// Check that the storage backend is reachable
    Health,

    /// Print an example configuration file
    ConfigSample,
}
