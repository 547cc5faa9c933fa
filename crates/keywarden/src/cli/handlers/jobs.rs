//! Deploy, purge, and validate command handlers

use std::path::Path;

use anyhow::{Context, Result};

use super::HandlerUtils;
use crate::cli::CliContext;
use crate::config::KeywardenConfig;
use crate::jobs::{resolve_jobs, BatchValidationError, KeyDeployJob, RawDeployJob, RawJobSet};
use crate::runner::JobRunner;

/// Handle the deploy command.
pub async fn handle_deploy(
    jobs_file: Option<&Path>,
    dry_run: bool,
    context: &CliContext,
) -> Result<()> {
    let config = HandlerUtils::load_config(&context.config_path)?;
    let Some(resolved) = resolve_or_report(jobs_file, &config)? else {
        return Ok(());
    };

    let runner = JobRunner::from_config(&config)?;
    let outcomes = runner.run_deploy(resolved, dry_run).await;

    let mut failures = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(summary) if summary.skipped => {
                HandlerUtils::print_info(&format!("{}: no keys resolved, skipped", outcome.user));
            }
            Ok(summary) if dry_run => {
                HandlerUtils::print_info(&format!(
                    "{}: would install {} keys",
                    outcome.user, summary.keys_installed
                ));
            }
            Ok(summary) => {
                HandlerUtils::print_success(&format!(
                    "{}: {} keys reconciled",
                    outcome.user, summary.keys_installed
                ));
            }
            Err(err) => {
                failures += 1;
                HandlerUtils::print_error(&format!("{}: {err}", outcome.user));
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} job(s) failed", outcomes.len());
    }
    Ok(())
}

/// Handle the purge command.
pub async fn handle_purge(
    jobs_file: Option<&Path>,
    force_refresh: bool,
    context: &CliContext,
) -> Result<()> {
    let config = HandlerUtils::load_config(&context.config_path)?;
    let Some(resolved) = resolve_or_report(jobs_file, &config)? else {
        return Ok(());
    };

    let runner = JobRunner::from_config(&config)?;
    let results = runner.run_purge(resolved, force_refresh).await?;

    let mut failures = 0;
    for (user, outcome) in &results {
        if outcome.failed > 0 {
            failures += outcome.failed;
            HandlerUtils::print_warning(&format!(
                "{user}: removed {} keys, {} failed",
                outcome.removed, outcome.failed
            ));
        } else {
            HandlerUtils::print_success(&format!("{user}: removed {} keys", outcome.removed));
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} key removal(s) failed");
    }
    Ok(())
}

/// Handle the validate command.
pub async fn handle_validate(jobs_file: Option<&Path>, context: &CliContext) -> Result<()> {
    let config = HandlerUtils::load_config(&context.config_path)?;
    let raw_jobs = load_raw_jobs(jobs_file, &config)?;

    if raw_jobs.is_empty() {
        HandlerUtils::print_warning("No jobs declared");
        return Ok(());
    }

    match resolve_jobs(&raw_jobs) {
        Ok(resolved) => {
            HandlerUtils::print_success(&format!("{} job(s) valid", resolved.len()));
            Ok(())
        }
        Err(err) => {
            report_violations(&err);
            anyhow::bail!("job batch rejected");
        }
    }
}

/// Load jobs and resolve the batch, reporting violations on failure.
///
/// Returns `None` when there is nothing to do (no jobs declared).
fn resolve_or_report(
    jobs_file: Option<&Path>,
    config: &KeywardenConfig,
) -> Result<Option<Vec<KeyDeployJob>>> {
    let raw_jobs = load_raw_jobs(jobs_file, config)?;
    if raw_jobs.is_empty() {
        HandlerUtils::print_warning("No jobs declared, nothing to do");
        return Ok(None);
    }

    match resolve_jobs(&raw_jobs) {
        Ok(resolved) => Ok(Some(resolved)),
        Err(err) => {
            report_violations(&err);
            anyhow::bail!("job batch rejected");
        }
    }
}

fn report_violations(err: &BatchValidationError) {
    HandlerUtils::print_error(&err.to_string());
    for violation in &err.violations {
        HandlerUtils::print_error(&format!("  {violation}"));
    }
}

/// Jobs come from the standalone file when given, otherwise from the main
/// configuration.
fn load_raw_jobs(jobs_file: Option<&Path>, config: &KeywardenConfig) -> Result<Vec<RawDeployJob>> {
    match jobs_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading jobs file {}", path.display()))?;
            let set: RawJobSet = toml::from_str(&text)
                .with_context(|| format!("parsing jobs file {}", path.display()))?;
            Ok(set.into_jobs())
        }
        None => Ok(config.jobs.clone()),
    }
}
