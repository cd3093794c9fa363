//! CLI interface module
//!
//! Runs one parsed [`Commands`] against a prepared [`AppContext`].

mod commands;

use crate::cli::Commands;
use crate::errors::Result;
use crate::system::lifetime::startup::AppContext;

pub use commands::*;

pub async fn run_command(ctx: &AppContext, command: Commands, base_url: &str) -> Result<()> {
    match command {
        Commands::Shorten { urls, owner } => shorten_urls(ctx, &urls, owner, base_url).await,
        Commands::Resolve { short_key } => resolve_key(ctx, &short_key).await,
        Commands::List { owner, json } => list_owner_urls(ctx, owner, json, base_url).await,
        Commands::Retire { owner, short_keys } => retire_keys(ctx, owner, &short_keys).await,
        Commands::Identify { token } => identify_visitor(ctx, token.as_deref()),
        Commands::Health => health(ctx).await,
        Commands::ConfigSample => {
            print_config_sample();
            Ok(())
        }
    }
}
