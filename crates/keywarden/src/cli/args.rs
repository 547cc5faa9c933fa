//! CLI argument parsing

use clap::Parser;

use super::commands::Commands;

/// Main application arguments
#[derive(Parser, Debug)]
#[command(
    name = "keywarden",
    version,
    about = "SSH public-key distribution and authorized_keys reconciliation",
    long_about = None
)]
pub struct KeywardenArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "keywarden.toml")]
    pub config: String,

    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Generate a sample configuration file and exit
    #[arg(long)]
    pub gen_config: bool,

    /// Command to run (defaults to deploy)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl KeywardenArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_is_accepted() {
        let args = KeywardenArgs::try_parse_from(["keywarden"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.config, "keywarden.toml");
        assert!(!args.gen_config);
    }

    #[test]
    fn deploy_flags_parse() {
        let args = KeywardenArgs::try_parse_from([
            "keywarden",
            "--config",
            "/etc/keywarden/config.toml",
            "deploy",
            "--jobs",
            "jobs.toml",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.config, "/etc/keywarden/config.toml");
        match args.command {
            Some(Commands::Deploy { jobs, dry_run }) => {
                assert_eq!(jobs.unwrap().to_str(), Some("jobs.toml"));
                assert!(dry_run);
            }
            other => panic!("expected deploy command, got {other:?}"),
        }
    }

    #[test]
    fn gen_config_flag_parses() {
        let args = KeywardenArgs::try_parse_from(["keywarden", "--gen-config"]).unwrap();
        assert!(args.gen_config);
    }
}
