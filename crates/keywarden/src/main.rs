//! Keywarden binary entry point
//!
//! Parses arguments, initializes logging, validates configuration, and
//! dispatches to the command handlers. Running without a subcommand
//! deploys the configured jobs.

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use common::config::ConfigValidation;
use keywarden::cli::{execute_command, CliContext, Commands, KeywardenArgs};
use keywarden::config::KeywardenConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let args = KeywardenArgs::parse_args();

    if args.gen_config {
        return generate_config(&args.config);
    }

    let config = load_config(&args.config)?;
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.level);
    init_logging(level);

    if let Err(err) = config.validate() {
        anyhow::bail!("Configuration validation failed: {err}");
    }
    for warning in config.warnings() {
        warn!("{warning}");
    }

    let command = args.command.unwrap_or(Commands::Deploy {
        jobs: None,
        dry_run: false,
    });
    let context = CliContext::new(args.config);
    execute_command(command, &context).await
}

/// Write a sample configuration file with compiled defaults.
fn generate_config(output_path: &str) -> Result<()> {
    let config = KeywardenConfig::default();
    let toml_content = toml::to_string_pretty(&config)?;
    std::fs::write(output_path, toml_content)?;
    println!("Generated configuration file: {output_path}");
    Ok(())
}

fn load_config(config_path: &str) -> Result<KeywardenConfig> {
    let path = std::path::Path::new(config_path);
    let config = if path.exists() {
        KeywardenConfig::load_from_file(path)?
    } else {
        KeywardenConfig::load(None)?
    };
    Ok(config)
}

/// Structured logging: RUST_LOG wins, the configured level is the fallback.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();
}
