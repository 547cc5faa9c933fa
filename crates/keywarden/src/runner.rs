//! Concurrent execution of deployment jobs
//!
//! One runner per process: it owns the shared fetcher, registry client,
//! and reconciliation engine, and spawns one task per job. A failing job
//! never aborts its siblings; every job reports its own outcome.

use std::sync::Arc;

use common::error::ConfigurationError;
use common::ssh::is_valid_github_username;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::config::KeywardenConfig;
use crate::jobs::KeyDeployJob;
use crate::reconcile::{
    FailurePolicy, LocalAuthorizedKeysWriter, PurgeOutcome, ReconcileError, ReconciliationEngine,
};
use crate::registry::{provider_from_config, KeyRegistryClient, RegistryError};
use crate::sources::{KeySource, KeySourceFetcher, SourceError};

/// Failure of one job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// The registry answered with zero managed keys for a job that
    /// depends on them.
    #[error("Registry returned no managed keys for user '{user}'")]
    EmptyManagedKeys { user: String },

    /// The spawned job task was cancelled or panicked.
    #[error("Job task failed: {details}")]
    Task { details: String },
}

impl common::error::KeywardenError for JobError {}

/// What one deploy job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    /// Number of keys handed to the writer (or that would have been, on a
    /// dry run).
    pub keys_installed: usize,
    /// True when the job resolved zero keys and the writer was not called.
    pub skipped: bool,
}

/// Result of one job, keyed by target user.
#[derive(Debug)]
pub struct JobOutcome {
    pub user: String,
    pub result: Result<JobSummary, JobError>,
}

/// Runs job batches against shared collaborators.
pub struct JobRunner {
    fetcher: Arc<KeySourceFetcher>,
    registry: Arc<KeyRegistryClient>,
    engine: Arc<ReconciliationEngine>,
}

impl JobRunner {
    pub fn new(
        fetcher: Arc<KeySourceFetcher>,
        registry: Arc<KeyRegistryClient>,
        engine: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            fetcher,
            registry,
            engine,
        }
    }

    /// Wire up a runner from configuration with the local writer.
    pub fn from_config(config: &KeywardenConfig) -> Result<Self, ConfigurationError> {
        let fetcher = Arc::new(KeySourceFetcher::new(&config.fetch)?);
        let provider = provider_from_config(&config.registry);
        let registry = Arc::new(KeyRegistryClient::new(&config.registry, provider)?);
        let writer = Arc::new(LocalAuthorizedKeysWriter::new(
            config.writer.home_root.clone(),
        ));
        let engine = Arc::new(ReconciliationEngine::new(writer));
        Ok(Self::new(fetcher, registry, engine))
    }

    /// Run every deploy job concurrently and collect per-job outcomes in
    /// batch order.
    pub async fn run_deploy(&self, jobs: Vec<KeyDeployJob>, dry_run: bool) -> Vec<JobOutcome> {
        let run_id = Uuid::new_v4();
        info!("Starting deploy run {run_id} with {} job(s)", jobs.len());

        let mut handles: Vec<(String, JoinHandle<Result<JobSummary, JobError>>)> =
            Vec::with_capacity(jobs.len());
        for job in jobs {
            let user = job.user.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let registry = Arc::clone(&self.registry);
            let engine = Arc::clone(&self.engine);
            handles.push((
                user,
                tokio::spawn(async move {
                    run_deploy_job(job, &fetcher, &registry, &engine, dry_run).await
                }),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (user, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(JobError::Task {
                    details: err.to_string(),
                }),
            };
            if let Err(err) = &result {
                error!("Deploy job for user '{user}' failed: {err}");
            }
            outcomes.push(JobOutcome { user, result });
        }

        info!("Deploy run {run_id} finished");
        outcomes
    }

    /// Remove registry-managed keys from every job's target account.
    ///
    /// The managed list is fetched once for the whole batch. Per-key
    /// removal failures are tallied, not fatal.
    pub async fn run_purge(
        &self,
        jobs: Vec<KeyDeployJob>,
        force_refresh: bool,
    ) -> Result<Vec<(String, PurgeOutcome)>, JobError> {
        let keys = self.registry.fetch_managed_keys(force_refresh).await?;
        if keys.is_empty() {
            info!("No managed keys to purge");
            return Ok(jobs
                .into_iter()
                .map(|job| (job.user, PurgeOutcome::default()))
                .collect());
        }

        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let outcome = self
                .engine
                .remove_keys(&job.user, job.group(), &keys, FailurePolicy::ContinueOnError)
                .await?;
            results.push((job.user, outcome));
        }
        Ok(results)
    }
}

async fn run_deploy_job(
    job: KeyDeployJob,
    fetcher: &KeySourceFetcher,
    registry: &KeyRegistryClient,
    engine: &ReconciliationEngine,
    dry_run: bool,
) -> Result<JobSummary, JobError> {
    let desired = collect_desired_keys(&job, fetcher, registry).await?;

    if desired.is_empty() {
        warn!("No keys resolved for user '{}', skipping", job.user);
        return Ok(JobSummary {
            keys_installed: 0,
            skipped: true,
        });
    }

    if dry_run {
        info!(
            "Dry run: would install {} keys for user '{}'",
            desired.len(),
            job.user
        );
        for key in &desired {
            debug!("  {key}");
        }
        return Ok(JobSummary {
            keys_installed: desired.len(),
            skipped: false,
        });
    }

    engine.deploy(&job, &desired).await?;
    Ok(JobSummary {
        keys_installed: desired.len(),
        skipped: false,
    })
}

/// Gather one job's desired keys: manual entries first, then declared
/// sources in order, then registry-managed keys.
///
/// GitHub usernames are checked again right before the request; an invalid
/// one is skipped with a warning and no network call. Any source fetch
/// failure fails the whole job, as does an empty managed-key list on a
/// job that asks for one.
pub async fn collect_desired_keys(
    job: &KeyDeployJob,
    fetcher: &KeySourceFetcher,
    registry: &KeyRegistryClient,
) -> Result<Vec<String>, JobError> {
    let mut fetched = Vec::new();

    for source in job.sources() {
        if let KeySource::Github { user } = &source {
            if !is_valid_github_username(user) {
                warn!(
                    "Skipping invalid GitHub username '{user}' for user '{}'",
                    job.user
                );
                continue;
            }
        }
        let keys = fetcher.fetch_keys(&source).await?;
        debug!(
            "Fetched {} keys from {source} for user '{}'",
            keys.len(),
            job.user
        );
        fetched.extend(keys);
    }

    if job.managed_keys {
        let managed = registry.fetch_managed_keys(false).await?;
        if managed.is_empty() {
            return Err(JobError::EmptyManagedKeys {
                user: job.user.clone(),
            });
        }
        debug!(
            "Fetched {} managed keys for user '{}'",
            managed.len(),
            job.user
        );
        fetched.extend(managed);
    }

    Ok(aggregate(&job.manual_keys, fetched, true))
}
