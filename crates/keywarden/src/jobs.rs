//! Deployment job definitions and batch validation
//!
//! Jobs arrive as raw TOML tables, either inline in the main configuration
//! or in a standalone jobs file, and are resolved into `KeyDeployJob`
//! values before anything else happens. Validation inspects the whole
//! batch and reports every violation at once; no job runs and no network
//! request is made for a batch containing an invalid job.

use std::fmt;

use common::ssh::is_valid_github_username;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sources::KeySource;

/// One deployment job as declared in configuration, prior to validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDeployJob {
    /// Target account whose authorized_keys file is reconciled.
    #[serde(default)]
    pub user: String,
    /// Group owning the authorized_keys file. Defaults to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Keys declared inline, installed ahead of fetched keys.
    #[serde(default)]
    pub manual_keys: Vec<String>,
    /// GitHub accounts whose uploaded keys are fetched.
    #[serde(default)]
    pub github_users: Vec<String>,
    /// Additional endpoints serving one key per line.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Include keys held by the remote key registry.
    #[serde(default)]
    pub managed_keys: bool,
    /// Remove existing keys that are not in the desired set.
    #[serde(default)]
    pub delete_unlisted: bool,
}

/// Standalone jobs file contents: a `[[jobs]]` batch or a single bare job.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawJobSet {
    Batch { jobs: Vec<RawDeployJob> },
    Single(RawDeployJob),
}

impl RawJobSet {
    pub fn into_jobs(self) -> Vec<RawDeployJob> {
        match self {
            RawJobSet::Batch { jobs } => jobs,
            RawJobSet::Single(job) => vec![job],
        }
    }
}

/// A validated deployment job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDeployJob {
    pub user: String,
    pub group: Option<String>,
    pub manual_keys: Vec<String>,
    pub github_users: Vec<String>,
    pub urls: Vec<String>,
    pub managed_keys: bool,
    pub delete_unlisted: bool,
}

impl KeyDeployJob {
    /// Group owning the target authorized_keys file.
    pub fn group(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.user)
    }

    /// Declared fetch sources in deployment order: GitHub users, then URLs.
    pub fn sources(&self) -> Vec<KeySource> {
        let mut sources = Vec::with_capacity(self.github_users.len() + self.urls.len());
        sources.extend(self.github_users.iter().map(|user| KeySource::github(user.clone())));
        sources.extend(self.urls.iter().map(|url| KeySource::url(url.clone())));
        sources
    }
}

/// One validation failure inside a job batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// Index of the offending job within the batch.
    pub job_index: usize,
    /// Field the violation was found in.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {}: {}: {}", self.job_index, self.field, self.message)
    }
}

/// Rejection of a whole job batch, carrying every violation found.
#[derive(Error, Debug)]
#[error("job batch rejected: {} violation(s)", violations.len())]
pub struct BatchValidationError {
    pub violations: Vec<ConfigViolation>,
}

impl common::error::KeywardenError for BatchValidationError {}

/// Validate a job batch, collecting every violation before rejecting.
///
/// Checks run on all jobs even after the first failure so an operator sees
/// the full list in one pass. Usernames and the target user are trimmed in
/// the resolved jobs.
pub fn resolve_jobs(raw_jobs: &[RawDeployJob]) -> Result<Vec<KeyDeployJob>, BatchValidationError> {
    let mut violations = Vec::new();

    for (index, job) in raw_jobs.iter().enumerate() {
        if job.user.trim().is_empty() {
            violations.push(ConfigViolation {
                job_index: index,
                field: "user",
                message: "must be a non-empty string".to_string(),
            });
        }
        if let Some(group) = &job.group {
            if group.trim().is_empty() {
                violations.push(ConfigViolation {
                    job_index: index,
                    field: "group",
                    message: "must not be empty when set".to_string(),
                });
            }
        }
        for (position, key) in job.manual_keys.iter().enumerate() {
            if key.trim().is_empty() {
                violations.push(ConfigViolation {
                    job_index: index,
                    field: "manual_keys",
                    message: format!("entry {position} is empty"),
                });
            }
        }
        for (position, username) in job.github_users.iter().enumerate() {
            let trimmed = username.trim();
            if trimmed.is_empty() {
                violations.push(ConfigViolation {
                    job_index: index,
                    field: "github_users",
                    message: format!("entry {position} is empty"),
                });
            } else if !is_valid_github_username(trimmed) {
                violations.push(ConfigViolation {
                    job_index: index,
                    field: "github_users",
                    message: format!("invalid GitHub username: {trimmed}"),
                });
            }
        }
        for (position, url) in job.urls.iter().enumerate() {
            if url.trim().is_empty() {
                violations.push(ConfigViolation {
                    job_index: index,
                    field: "urls",
                    message: format!("entry {position} is empty"),
                });
            }
        }
    }

    if !violations.is_empty() {
        return Err(BatchValidationError { violations });
    }

    Ok(raw_jobs
        .iter()
        .map(|job| KeyDeployJob {
            user: job.user.trim().to_string(),
            group: job.group.clone(),
            manual_keys: job.manual_keys.clone(),
            github_users: job
                .github_users
                .iter()
                .map(|username| username.trim().to_string())
                .collect(),
            urls: job.urls.clone(),
            managed_keys: job.managed_keys,
            delete_unlisted: job.delete_unlisted,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_job(user: &str) -> RawDeployJob {
        RawDeployJob {
            user: user.to_string(),
            ..RawDeployJob::default()
        }
    }

    #[test]
    fn resolves_valid_batch_with_trimming() {
        let mut job = raw_job("  alice  ");
        job.github_users = vec![" octocat ".to_string()];

        let resolved = resolve_jobs(&[job]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].user, "alice");
        assert_eq!(resolved[0].github_users, vec!["octocat".to_string()]);
    }

    #[test]
    fn group_defaults_to_user() {
        let resolved = resolve_jobs(&[raw_job("deploy")]).unwrap();
        assert_eq!(resolved[0].group(), "deploy");

        let mut with_group = raw_job("deploy");
        with_group.group = Some("ops".to_string());
        let resolved = resolve_jobs(&[with_group]).unwrap();
        assert_eq!(resolved[0].group(), "ops");
    }

    #[test]
    fn one_invalid_job_rejects_the_whole_batch() {
        let good = raw_job("alice");
        let bad = raw_job("");

        let err = resolve_jobs(&[good, bad]).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].job_index, 1);
        assert_eq!(err.violations[0].field, "user");
    }

    #[test]
    fn all_violations_are_collected() {
        let mut first = raw_job("");
        first.manual_keys = vec!["  ".to_string()];

        let mut second = raw_job("bob");
        second.github_users = vec!["-bad".to_string(), "also--fine".to_string()];
        second.urls = vec![String::new()];

        let err = resolve_jobs(&[first, second]).unwrap_err();
        let indexed: Vec<(usize, &str)> = err
            .violations
            .iter()
            .map(|v| (v.job_index, v.field))
            .collect();
        assert_eq!(
            indexed,
            vec![
                (0, "user"),
                (0, "manual_keys"),
                (1, "github_users"),
                (1, "urls"),
            ]
        );
    }

    #[test]
    fn github_username_grammar_is_enforced() {
        let mut job = raw_job("alice");
        job.github_users = vec!["a".repeat(40)];

        let err = resolve_jobs(&[job]).unwrap_err();
        assert_eq!(err.violations[0].field, "github_users");
        assert!(err.violations[0].message.contains("invalid GitHub username"));
    }

    #[test]
    fn sources_preserve_declaration_order() {
        let mut job = raw_job("alice");
        job.github_users = vec!["octocat".to_string()];
        job.urls = vec!["https://keys.example.com/team.keys".to_string()];

        let resolved = resolve_jobs(&[job]).unwrap();
        let sources = resolved[0].sources();
        assert_eq!(
            sources,
            vec![
                KeySource::github("octocat"),
                KeySource::url("https://keys.example.com/team.keys"),
            ]
        );
    }

    #[test]
    fn jobs_file_parses_batch_and_single_forms() {
        let batch: RawJobSet = toml::from_str(
            r#"
            [[jobs]]
            user = "alice"
            github_users = ["octocat"]

            [[jobs]]
            user = "bob"
            manual_keys = ["ssh-ed25519 AAAA bob@laptop"]
            "#,
        )
        .unwrap();
        assert_eq!(batch.into_jobs().len(), 2);

        let single: RawJobSet = toml::from_str(
            r#"
            user = "alice"
            delete_unlisted = true
            "#,
        )
        .unwrap();
        let jobs = single.into_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].user, "alice");
        assert!(jobs[0].delete_unlisted);
    }
}
