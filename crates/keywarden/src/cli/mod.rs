//! CLI interface for Keywarden
//!
//! Command parsing and dispatch. Handlers own the actual work; this module
//! only routes a parsed command to its handler with the shared context.

use anyhow::Result;

pub mod args;
pub mod commands;
pub mod handlers;

pub use args::KeywardenArgs;
pub use commands::Commands;

/// Context shared by all command handlers.
pub struct CliContext {
    /// Path to the configuration file.
    pub config_path: String,
}

impl CliContext {
    pub fn new(config_path: String) -> Self {
        Self { config_path }
    }
}

/// Execute a CLI command.
pub async fn execute_command(command: Commands, context: &CliContext) -> Result<()> {
    match command {
        Commands::Deploy { jobs, dry_run } => {
            handlers::jobs::handle_deploy(jobs.as_deref(), dry_run, context).await
        }
        Commands::Purge {
            jobs,
            force_refresh,
        } => handlers::jobs::handle_purge(jobs.as_deref(), force_refresh, context).await,
        Commands::Validate { jobs } => {
            handlers::jobs::handle_validate(jobs.as_deref(), context).await
        }
        Commands::ListKeys { force_refresh } => {
            handlers::registry::handle_list_keys(force_refresh, context).await
        }
        Commands::ClearCache => handlers::registry::handle_clear_cache(context).await,
    }
}
