//! Key acquisition from GitHub accounts and URL endpoints
//!
//! Sources return raw authorized_keys lines, already validated against the
//! key grammar. GitHub-sourced lines carry a trailing provenance comment
//! naming the account they came from. Transient failures are retried with
//! a fixed delay; a 404 is terminal and fails the fetch immediately.

use std::fmt;
use std::time::Duration;

use common::error::ConfigurationError;
use common::retry::{RetryPolicy, Retryable};
use common::ssh::is_valid_key_line;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FetchConfig;

/// Public GitHub endpoint serving a user's uploaded keys at `/{user}.keys`.
const GITHUB_KEYS_BASE: &str = "https://github.com";

/// A single declared origin of candidate keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Keys uploaded to a GitHub account.
    Github { user: String },
    /// Arbitrary endpoint returning one key per line.
    Url { url: String },
}

impl KeySource {
    pub fn github(user: impl Into<String>) -> Self {
        Self::Github { user: user.into() }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    fn endpoint(&self, github_base: &str) -> String {
        match self {
            Self::Github { user } => format!("{github_base}/{user}.keys"),
            Self::Url { url } => url.clone(),
        }
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Github { user } => write!(f, "github user '{user}'"),
            Self::Url { url } => write!(f, "url {url}"),
        }
    }
}

/// Errors from fetching one key source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The endpoint returned 404. Never retried.
    #[error("Key source not found: {url}")]
    NotFound { url: String },

    /// The endpoint returned an unexpected status.
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The request itself failed (connect error, timeout, bad body).
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error("Fetching {url} failed after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<SourceError>,
    },
}

impl common::error::KeywardenError for SourceError {}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::RetriesExhausted { .. } => false,
            Self::Status { .. } | Self::Request { .. } => true,
        }
    }
}

/// Fetches candidate keys from declared sources.
///
/// One fetcher is shared across all jobs of a run; it owns the HTTP client
/// and the retry policy.
pub struct KeySourceFetcher {
    http: reqwest::Client,
    policy: RetryPolicy,
    github_base: String,
}

impl KeySourceFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|err| {
                ConfigurationError::validation_failed(format!(
                    "failed to build HTTP client: {err}"
                ))
            })?;
        let policy = RetryPolicy::fixed(
            config.max_retries,
            Duration::from_secs(config.retry_delay_secs),
        );
        Ok(Self {
            http,
            policy,
            github_base: GITHUB_KEYS_BASE.to_string(),
        })
    }

    /// Point GitHub lookups at a different base URL.
    pub fn with_github_base(mut self, base: impl Into<String>) -> Self {
        self.github_base = base.into();
        self
    }

    /// Fetch and validate every key one source serves.
    ///
    /// Invalid and blank lines are dropped with a warning. The request is
    /// retried on transient failures; exhaustion surfaces as
    /// `RetriesExhausted` with the last error as its cause.
    pub async fn fetch_keys(&self, source: &KeySource) -> Result<Vec<String>, SourceError> {
        let url = source.endpoint(&self.github_base);
        debug!("Fetching keys from {source}");

        let outcome = self
            .policy
            .retry(&format!("fetch {source}"), || self.fetch_once(&url))
            .await;

        let body = match outcome {
            Ok(body) => body,
            Err(err) if err.is_retryable() => {
                return Err(SourceError::RetriesExhausted {
                    url,
                    attempts: self.policy.max_attempts(),
                    source: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        };

        Ok(parse_key_lines(&body, source))
    }

    async fn fetch_once(&self, url: &str) -> Result<String, SourceError> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()
            .await
            .map_err(|source| SourceError::Request {
                url: url.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(SourceError::NotFound {
                url: url.to_string(),
            }),
            status if status.is_success() => {
                response.text().await.map_err(|source| SourceError::Request {
                    url: url.to_string(),
                    source,
                })
            }
            status => Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

/// Split a response body into validated key lines.
///
/// GitHub-sourced keys get a trailing `{user}@github` provenance comment so
/// an installed key can be traced back to the account that published it.
pub fn parse_key_lines(body: &str, source: &KeySource) -> Vec<String> {
    let mut keys = Vec::new();
    for (line_number, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !is_valid_key_line(line) {
            warn!(
                "Skipping invalid key on line {} from {source}",
                line_number + 1
            );
            continue;
        }
        match source {
            KeySource::Github { user } => keys.push(format!("{line} {user}@github")),
            KeySource::Url { .. } => keys.push(line.to_string()),
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_lines_get_provenance_comment() {
        let source = KeySource::github("alice");
        let keys = parse_key_lines("ssh-ed25519 AAAA\nssh-rsa BBBB\n", &source);
        assert_eq!(
            keys,
            vec![
                "ssh-ed25519 AAAA alice@github".to_string(),
                "ssh-rsa BBBB alice@github".to_string(),
            ]
        );
    }

    #[test]
    fn url_lines_pass_through_verbatim() {
        let source = KeySource::url("https://keys.example.com/team.keys");
        let keys = parse_key_lines("ssh-ed25519 AAAA ops@bastion\n", &source);
        assert_eq!(keys, vec!["ssh-ed25519 AAAA ops@bastion".to_string()]);
    }

    #[test]
    fn blank_and_invalid_lines_are_dropped() {
        let source = KeySource::github("alice");
        let body = "\n  \nnot a key\nssh-ed25519 AAAA\ngarbage\n";
        let keys = parse_key_lines(body, &source);
        assert_eq!(keys, vec!["ssh-ed25519 AAAA alice@github".to_string()]);
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        let not_found = SourceError::NotFound {
            url: "https://github.com/ghost.keys".to_string(),
        };
        assert!(!not_found.is_retryable());

        let status = SourceError::Status {
            url: "https://github.com/alice.keys".to_string(),
            status: 503,
        };
        assert!(status.is_retryable());

        let exhausted = SourceError::RetriesExhausted {
            url: "https://github.com/alice.keys".to_string(),
            attempts: 4,
            source: Box::new(status),
        };
        assert!(!exhausted.is_retryable());
    }

    #[test]
    fn github_endpoint_is_user_dot_keys() {
        let source = KeySource::github("octocat");
        assert_eq!(
            source.endpoint("https://github.com"),
            "https://github.com/octocat.keys"
        );

        let url = KeySource::url("https://keys.example.com/all");
        assert_eq!(url.endpoint("https://github.com"), "https://keys.example.com/all");
    }
}
