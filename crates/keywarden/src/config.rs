//! Keywarden configuration
//!
//! Loaded in layers: compiled defaults, then an optional TOML file, then
//! KEYWARDEN_* environment variables (double underscore for nesting, e.g.
//! `KEYWARDEN_FETCH__MAX_RETRIES`). Deployment jobs live inline under
//! `[[jobs]]` or in a standalone jobs file passed on the command line.

use std::path::{Path, PathBuf};

use common::config::{load_config_with_options, ConfigValidation, LoadOptions};
use common::error::ConfigurationError;
use serde::{Deserialize, Serialize};

use crate::jobs::RawDeployJob;
use crate::registry::DEFAULT_REGISTRY_URL;

/// Top-level Keywarden configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KeywardenConfig {
    /// Key registry access.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Key source fetching.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Local authorized_keys writing.
    #[serde(default)]
    pub writer: WriterConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Deployment jobs, one per target account.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<RawDeployJob>,
}

/// Remote key registry access.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Registry endpoint.
    pub base_url: String,
    /// Login username. Prompted for when unset and managed keys are used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Login password. Prompted for when unset and managed keys are used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

/// Key source fetching.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Fixed delay between attempts in seconds.
    pub retry_delay_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            retry_delay_secs: 1,
        }
    }
}

/// Local authorized_keys writing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WriterConfig {
    /// Directory containing user home directories.
    pub home_root: PathBuf,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            home_root: PathBuf::from("/home"),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Level used when RUST_LOG is unset (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl KeywardenConfig {
    /// Layered load: defaults, discovered file (if any), environment.
    pub fn load(path_override: Option<PathBuf>) -> Result<Self, ConfigurationError> {
        let options = LoadOptions {
            config_path: path_override,
            ..LoadOptions::default()
        };
        load_config_with_options(options)
    }

    /// Load from a specific file, which must exist.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        common::config::load_from_file(path)
    }
}

impl ConfigValidation for KeywardenConfig {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.registry.base_url.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "registry.base_url",
                &self.registry.base_url,
                "must not be empty",
            ));
        }
        if self.registry.timeout_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "registry.timeout_secs",
                "0",
                "must be greater than 0",
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "fetch.timeout_secs",
                "0",
                "must be greater than 0",
            ));
        }
        if self.registry.password.is_some() && self.registry.username.is_none() {
            return Err(ConfigurationError::MissingRequired {
                key: "registry.username".to_string(),
            });
        }
        if self.writer.home_root.as_os_str().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "writer.home_root",
                "",
                "must not be empty",
            ));
        }
        Ok(())
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.jobs.is_empty() {
            warnings.push(
                "no jobs declared; deploy and purge do nothing unless --jobs is given".to_string(),
            );
        }
        if self.registry.username.is_some() && self.registry.password.is_none() {
            warnings.push(
                "registry.username is set without registry.password; the password will be prompted for".to_string(),
            );
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_documented_values() {
        let config = KeywardenConfig::default();
        assert_eq!(config.registry.base_url, DEFAULT_REGISTRY_URL);
        assert_eq!(config.registry.timeout_secs, 30);
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.retry_delay_secs, 1);
        assert_eq!(config.writer.home_root, PathBuf::from("/home"));
        assert_eq!(config.logging.level, "info");
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn parses_full_config_file() {
        let toml_content = r#"
            [registry]
            base_url = "https://registry.internal"
            username = "admin"
            password = "secret"
            timeout_secs = 15

            [fetch]
            timeout_secs = 5
            max_retries = 2
            retry_delay_secs = 1

            [writer]
            home_root = "/srv/home"

            [logging]
            level = "debug"

            [[jobs]]
            user = "deploy"
            github_users = ["octocat"]
            managed_keys = true

            [[jobs]]
            user = "ops"
            manual_keys = ["ssh-ed25519 AAAA ops@bastion"]
            delete_unlisted = true
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = KeywardenConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.registry.base_url, "https://registry.internal");
        assert_eq!(config.registry.username.as_deref(), Some("admin"));
        assert_eq!(config.fetch.max_retries, 2);
        assert_eq!(config.writer.home_root, PathBuf::from("/srv/home"));
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].user, "deploy");
        assert!(config.jobs[0].managed_keys);
        assert!(config.jobs[1].delete_unlisted);
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        env::set_var("KEYWARDEN_FETCH__MAX_RETRIES", "7");
        env::set_var("KEYWARDEN_REGISTRY__BASE_URL", "https://env.registry");

        let config = KeywardenConfig::load(None).unwrap();
        assert_eq!(config.fetch.max_retries, 7);
        assert_eq!(config.registry.base_url, "https://env.registry");

        env::remove_var("KEYWARDEN_FETCH__MAX_RETRIES");
        env::remove_var("KEYWARDEN_REGISTRY__BASE_URL");
    }

    #[test]
    fn validation_rejects_zero_timeouts() {
        let mut config = KeywardenConfig::default();
        config.fetch.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = KeywardenConfig::default();
        config.registry.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_requires_username_with_password() {
        let mut config = KeywardenConfig::default();
        config.registry.password = Some("secret".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registry.username"));
    }

    #[test]
    fn warnings_flag_missing_jobs_and_password() {
        let mut config = KeywardenConfig::default();
        config.registry.username = Some("admin".to_string());
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 2);

        config.jobs.push(RawDeployJob {
            user: "deploy".to_string(),
            ..RawDeployJob::default()
        });
        config.registry.password = Some("secret".to_string());
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn default_config_serializes_to_toml() {
        let rendered = toml::to_string_pretty(&KeywardenConfig::default()).unwrap();
        assert!(rendered.contains("[registry]"));
        assert!(rendered.contains("[fetch]"));
        let parsed: KeywardenConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.fetch.max_retries, 3);
    }
}
