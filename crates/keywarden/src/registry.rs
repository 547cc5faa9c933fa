//! Key registry client
//!
//! Authenticated client for the remote key-management API. The client logs
//! in once, reuses the session token for the life of the process, and
//! caches the fetched key list so concurrent jobs share a single login and
//! a single list request. All session state lives behind one async mutex,
//! held across the login and fetch awaits, so racing callers serialize
//! instead of issuing duplicate requests.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use common::error::ConfigurationError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;

/// Default registry endpoint, overridden by `[registry].base_url`.
pub const DEFAULT_REGISTRY_URL: &str = "https://keyregistry.example.com";

/// Errors from talking to the key registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Login was rejected.
    #[error("Registry login failed with status {status}")]
    AuthenticationFailed { status: u16 },

    /// No credentials could be obtained.
    #[error("Registry credentials unavailable: {reason}")]
    CredentialsUnavailable { reason: String },

    /// A response was missing a field the API contract requires.
    #[error("Registry response missing required '{field}' field")]
    ContractViolation { field: &'static str },

    /// A response body could not be decoded.
    #[error("Invalid registry response: {details}")]
    InvalidResponse { details: String },

    /// An endpoint returned an unexpected status.
    #[error("Registry {endpoint} request returned status {status}")]
    Status { endpoint: &'static str, status: u16 },

    /// The request itself failed.
    #[error("Registry request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl common::error::KeywardenError for RegistryError {}

/// Login credentials for the key registry.
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

/// Supplies registry credentials on demand.
///
/// The client asks once and caches the result for the life of the session,
/// so interactive providers prompt at most once per process.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn credentials(&self) -> Result<RegistryCredentials, RegistryError>;
}

/// Credentials taken from configuration or the environment.
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn credentials(&self) -> Result<RegistryCredentials, RegistryError> {
        Ok(RegistryCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

/// Prompts for credentials on the controlling terminal, masking the
/// password. Refuses to prompt when stdin is not a terminal.
pub struct PromptCredentials;

#[async_trait]
impl CredentialsProvider for PromptCredentials {
    async fn credentials(&self) -> Result<RegistryCredentials, RegistryError> {
        tokio::task::spawn_blocking(prompt_for_credentials)
            .await
            .map_err(|err| RegistryError::CredentialsUnavailable {
                reason: format!("prompt task failed: {err}"),
            })?
    }
}

fn prompt_for_credentials() -> Result<RegistryCredentials, RegistryError> {
    use std::io::{BufRead, IsTerminal, Write};

    if !std::io::stdin().is_terminal() {
        return Err(RegistryError::CredentialsUnavailable {
            reason: "stdin is not a terminal; set registry credentials in configuration"
                .to_string(),
        });
    }

    let mut stdout = std::io::stdout();
    write!(stdout, "Registry username: ").map_err(prompt_failed)?;
    stdout.flush().map_err(prompt_failed)?;

    let mut username = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut username)
        .map_err(prompt_failed)?;

    let password = rpassword::prompt_password("Registry password: ").map_err(prompt_failed)?;

    Ok(RegistryCredentials {
        username: username.trim().to_string(),
        password,
    })
}

fn prompt_failed(err: std::io::Error) -> RegistryError {
    RegistryError::CredentialsUnavailable {
        reason: err.to_string(),
    }
}

/// Choose a credentials source: configured values win, prompting is the
/// fallback.
pub fn provider_from_config(config: &RegistryConfig) -> Arc<dyn CredentialsProvider> {
    match (&config.username, &config.password) {
        (Some(username), Some(password)) => {
            Arc::new(StaticCredentials::new(username.clone(), password.clone()))
        }
        _ => Arc::new(PromptCredentials),
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    session_key: Option<String>,
}

/// Cached managed key list.
struct ManagedKeyCache {
    keys: Vec<String>,
    fetched_at: SystemTime,
}

/// Mutable session state, guarded by one mutex.
#[derive(Default)]
struct RegistryState {
    credentials: Option<RegistryCredentials>,
    session_token: Option<String>,
    cache: Option<ManagedKeyCache>,
}

/// Client for the key registry API.
pub struct KeyRegistryClient {
    http: reqwest::Client,
    base_url: String,
    provider: Arc<dyn CredentialsProvider>,
    state: Mutex<RegistryState>,
}

impl KeyRegistryClient {
    pub fn new(
        config: &RegistryConfig,
        provider: Arc<dyn CredentialsProvider>,
    ) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|err| {
                ConfigurationError::validation_failed(format!(
                    "failed to build HTTP client: {err}"
                ))
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            provider,
            state: Mutex::new(RegistryState::default()),
        })
    }

    /// Fetch the managed key list, logging in first when needed.
    ///
    /// A cached non-empty list is served without touching the network
    /// unless `force_refresh` is set; an empty cached list is refetched.
    /// The session mutex is held across login and fetch, so concurrent
    /// callers produce exactly one login and one list request.
    pub async fn fetch_managed_keys(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<String>, RegistryError> {
        let mut state = self.state.lock().await;

        if !force_refresh {
            if let Some(cache) = &state.cache {
                if !cache.keys.is_empty() {
                    debug!(
                        "Serving {} managed keys cached at {:?}",
                        cache.keys.len(),
                        cache.fetched_at
                    );
                    return Ok(cache.keys.clone());
                }
            }
        }

        let token = match state.session_token.clone() {
            Some(token) => token,
            None => self.login(&mut state).await?,
        };

        let keys = self.fetch_key_list(&token).await?;
        if keys.is_empty() {
            warn!("Key registry returned no managed keys");
        }

        state.cache = Some(ManagedKeyCache {
            keys: keys.clone(),
            fetched_at: SystemTime::now(),
        });
        Ok(keys)
    }

    /// Drop credentials, session token, and cached keys in one step.
    pub async fn clear_cache(&self) {
        let mut state = self.state.lock().await;
        state.credentials = None;
        state.session_token = None;
        state.cache = None;
        debug!("Registry session and key cache cleared");
    }

    async fn login(&self, state: &mut RegistryState) -> Result<String, RegistryError> {
        let credentials = match state.credentials.clone() {
            Some(credentials) => credentials,
            None => {
                let credentials = self.provider.credentials().await?;
                state.credentials = Some(credentials.clone());
                credentials
            }
        };

        info!("Authenticating to key registry at {}", self.base_url);
        let response = self
            .http
            .post(format!("{}/login/", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RegistryError::AuthenticationFailed {
                status: status.as_u16(),
            });
        }

        let body: LoginResponse =
            response
                .json()
                .await
                .map_err(|err| RegistryError::InvalidResponse {
                    details: format!("login response: {err}"),
                })?;

        // A 200 without a session key still means we cannot proceed.
        let token = body
            .session_key
            .ok_or(RegistryError::ContractViolation {
                field: "session_key",
            })?;

        state.session_token = Some(token.clone());
        debug!("Registry login succeeded");
        Ok(token)
    }

    async fn fetch_key_list(&self, token: &str) -> Result<Vec<String>, RegistryError> {
        let response = self
            .http
            .get(format!("{}/ssh-tools/ssh-keylist/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::COOKIE, format!("sessionid={token}"))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RegistryError::Status {
                endpoint: "ssh-keylist",
                status: status.as_u16(),
            });
        }

        let payload: serde_json::Value =
            response
                .json()
                .await
                .map_err(|err| RegistryError::InvalidResponse {
                    details: format!("key list response: {err}"),
                })?;

        let records = payload
            .get("result")
            .and_then(serde_json::Value::as_array)
            .ok_or(RegistryError::ContractViolation { field: "result" })?;

        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            match record.get("key").and_then(serde_json::Value::as_str) {
                Some(key) => keys.push(key.to_string()),
                None => debug!("Skipping registry record without a 'key' field"),
            }
        }

        debug!("Fetched {} managed keys from registry", keys.len());
        Ok(keys)
    }
}
