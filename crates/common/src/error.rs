//! Error handling for Keywarden
//!
//! This module defines the core error handling infrastructure used throughout
//! the Keywarden system. It provides:
//! - `KeywardenError` trait for consistent error handling
//! - Specific error types for the shared domains (Config, SSH keys)
//! - Integration with `thiserror` for ergonomic error handling
//!
//! # Design Principles
//! - All errors implement Send + Sync for async compatibility
//! - Use thiserror for library errors, anyhow for application errors
//! - Provide clear, actionable error messages
//! - Support error chaining and context

use thiserror::Error;

/// Base trait for all Keywarden-specific errors
///
/// This trait ensures all Keywarden errors are:
/// - Thread-safe (Send + Sync)
/// - Static lifetime (no borrowed data)
/// - Implement standard Error trait
///
/// # Implementation Notes for Developers
/// When creating new error types:
/// 1. Derive from thiserror::Error
/// 2. Implement KeywardenError trait
/// 3. Use `#[from]` or `#[source]` for conversions from underlying errors
/// 4. Provide clear, user-facing error messages
/// 5. Include context information where helpful
pub trait KeywardenError: std::error::Error + Send + Sync + 'static {}

/// Configuration-related errors
///
/// These errors occur while loading, parsing, or validating
/// configuration from files and environment variables.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing failed
    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Required configuration missing
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    /// Environment variable error
    #[error("Environment variable error for '{var}': {details}")]
    EnvironmentError { var: String, details: String },

    /// Validation failed
    #[error("Configuration validation failed: {details}")]
    ValidationFailed { details: String },
}

impl KeywardenError for ConfigurationError {}

/// SSH public key errors
///
/// These errors occur while parsing authorized_keys entries.
#[derive(Error, Debug)]
pub enum SshKeyError {
    /// Key algorithm is not in the accepted set
    #[error("Unsupported key algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Key line does not satisfy the authorized_keys grammar
    #[error("Malformed key line: {details}")]
    MalformedLine { details: String },
}

impl KeywardenError for SshKeyError {}

/// Utility functions for common error scenarios
impl ConfigurationError {
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn validation_failed(details: impl Into<String>) -> Self {
        Self::ValidationFailed {
            details: details.into(),
        }
    }
}

impl SshKeyError {
    pub fn malformed_line(details: impl Into<String>) -> Self {
        Self::MalformedLine {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigurationError::MissingRequired {
            key: "registry.base_url".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required configuration: registry.base_url"
        );

        let err = SshKeyError::UnsupportedAlgorithm {
            algorithm: "ssh-foo".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported key algorithm: ssh-foo");
    }

    #[test]
    fn test_error_source_chain() {
        let err = ConfigurationError::invalid_value("fetch.timeout_secs", "0", "must be positive");
        assert!(err.to_string().contains("fetch.timeout_secs"));
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_keywarden_error_trait() {
        fn assert_keywarden_error(_: impl KeywardenError) {}

        assert_keywarden_error(ConfigurationError::validation_failed("test"));
        assert_keywarden_error(SshKeyError::malformed_line("test"));
    }
}
