//! Reconciliation engine
//!
//! Turns a desired key set into writer calls. The engine never retries the
//! writer. Failure handling differs by path and is an explicit argument on
//! the removal side.

pub mod writer;

pub use writer::{AuthorizedKeysWriter, LocalAuthorizedKeysWriter, WriterError};

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::jobs::KeyDeployJob;

/// How a multi-step removal pass reacts to writer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure and return it.
    AbortOnFirstError,
    /// Keep going, tally failures, and report them in the outcome.
    ContinueOnError,
}

/// Writer failure wrapped with job context.
#[derive(Error, Debug)]
#[error("Reconciliation failed for user '{user}' ({key_count} keys): {source}")]
pub struct ReconcileError {
    pub user: String,
    pub key_count: usize,
    #[source]
    pub source: WriterError,
}

impl common::error::KeywardenError for ReconcileError {}

/// Aggregate result of a continue-on-error removal pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub removed: usize,
    pub failed: usize,
}

/// Hands desired state to an authorized_keys writer.
pub struct ReconciliationEngine {
    writer: Arc<dyn AuthorizedKeysWriter>,
}

impl ReconciliationEngine {
    pub fn new(writer: Arc<dyn AuthorizedKeysWriter>) -> Self {
        Self { writer }
    }

    /// Install the desired key set for one job.
    ///
    /// The writer is invoked at most once. An empty desired set skips the
    /// job entirely; an account with no declared keys is never touched.
    pub async fn deploy(
        &self,
        job: &KeyDeployJob,
        desired_keys: &[String],
    ) -> Result<(), ReconcileError> {
        if desired_keys.is_empty() {
            info!("No keys to reconcile for user '{}', skipping", job.user);
            return Ok(());
        }

        info!(
            "Reconciling {} keys for user '{}'",
            desired_keys.len(),
            job.user
        );
        self.writer
            .write(&job.user, job.group(), desired_keys, job.delete_unlisted)
            .await
            .map_err(|source| ReconcileError {
                user: job.user.clone(),
                key_count: desired_keys.len(),
                source,
            })
    }

    /// Remove keys from one account, one writer call per key.
    ///
    /// Comments are stripped before removal so matching happens on the
    /// algorithm and key data alone. With `ContinueOnError` individual
    /// failures are tallied and the pass completes; with
    /// `AbortOnFirstError` the first failure is returned.
    pub async fn remove_keys(
        &self,
        user: &str,
        group: &str,
        keys: &[String],
        policy: FailurePolicy,
    ) -> Result<PurgeOutcome, ReconcileError> {
        let mut outcome = PurgeOutcome::default();

        for key in keys {
            let target = key_material(key);
            match self.writer.remove(user, group, &target).await {
                Ok(()) => outcome.removed += 1,
                Err(source) => match policy {
                    FailurePolicy::AbortOnFirstError => {
                        return Err(ReconcileError {
                            user: user.to_string(),
                            key_count: keys.len(),
                            source,
                        });
                    }
                    FailurePolicy::ContinueOnError => {
                        warn!("Failed to remove a key for user '{user}': {source}");
                        outcome.failed += 1;
                    }
                },
            }
        }

        info!(
            "Removed {} of {} keys for user '{user}' ({} failed)",
            outcome.removed,
            keys.len(),
            outcome.failed
        );
        Ok(outcome)
    }
}

/// Algorithm and key data of a key line with the comment dropped.
///
/// Lines with fewer than two tokens are returned trimmed, unchanged.
pub fn key_material(line: &str) -> String {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(algorithm), Some(data)) => format!("{algorithm} {data}"),
        _ => line.trim().to_string(),
    }
}
