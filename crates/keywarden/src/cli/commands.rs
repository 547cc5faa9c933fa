//! CLI command definitions

use std::path::PathBuf;

use clap::Subcommand;

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Resolve all jobs and reconcile authorized keys for each target user
    Deploy {
        /// Standalone jobs file overriding the jobs in the main config
        #[arg(long)]
        jobs: Option<PathBuf>,

        /// Resolve and fetch keys but skip writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove registry-managed keys from every target user
    Purge {
        /// Standalone jobs file overriding the jobs in the main config
        #[arg(long)]
        jobs: Option<PathBuf>,

        /// Refetch the managed key list even if cached
        #[arg(long)]
        force_refresh: bool,
    },

    /// Validate job configuration and exit without any network access
    Validate {
        /// Standalone jobs file overriding the jobs in the main config
        #[arg(long)]
        jobs: Option<PathBuf>,
    },

    /// Print the keys held by the key registry
    ListKeys {
        /// Refetch the managed key list even if cached
        #[arg(long)]
        force_refresh: bool,
    },

    /// Drop the registry session and cached key list
    ClearCache,
}
