//! SSH public key types and validation

use serde::{Deserialize, Serialize};

use crate::error::SshKeyError;

/// SSH public key algorithms accepted in authorized_keys entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// RSA algorithm
    Rsa,
    /// DSA algorithm (legacy, still accepted)
    Dss,
    /// Ed25519 algorithm
    Ed25519,
    /// Ed448 algorithm
    Ed448,
    /// ECDSA over NIST P-256
    EcdsaNistp256,
    /// ECDSA over NIST P-384
    EcdsaNistp384,
    /// ECDSA over NIST P-521
    EcdsaNistp521,
}

impl KeyAlgorithm {
    /// Identifier as it appears in an authorized_keys line.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "ssh-rsa",
            KeyAlgorithm::Dss => "ssh-dss",
            KeyAlgorithm::Ed25519 => "ssh-ed25519",
            KeyAlgorithm::Ed448 => "ssh-ed448",
            KeyAlgorithm::EcdsaNistp256 => "ecdsa-sha2-nistp256",
            KeyAlgorithm::EcdsaNistp384 => "ecdsa-sha2-nistp384",
            KeyAlgorithm::EcdsaNistp521 => "ecdsa-sha2-nistp521",
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for KeyAlgorithm {
    type Err = SshKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ssh-rsa" => Ok(KeyAlgorithm::Rsa),
            "ssh-dss" => Ok(KeyAlgorithm::Dss),
            "ssh-ed25519" => Ok(KeyAlgorithm::Ed25519),
            "ssh-ed448" => Ok(KeyAlgorithm::Ed448),
            "ecdsa-sha2-nistp256" => Ok(KeyAlgorithm::EcdsaNistp256),
            "ecdsa-sha2-nistp384" => Ok(KeyAlgorithm::EcdsaNistp384),
            "ecdsa-sha2-nistp521" => Ok(KeyAlgorithm::EcdsaNistp521),
            _ => Err(SshKeyError::UnsupportedAlgorithm {
                algorithm: s.to_string(),
            }),
        }
    }
}

/// A parsed authorized_keys entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshPublicKey {
    /// Key algorithm
    pub algorithm: KeyAlgorithm,
    /// Base64 key material
    pub key_data: String,
    /// Trailing comment, if any
    pub comment: Option<String>,
}

impl SshPublicKey {
    /// Parse one authorized_keys line.
    ///
    /// Requires an algorithm token from the accepted set followed by key
    /// data; anything after the second token becomes the comment. The
    /// algorithm comparison is case-insensitive.
    pub fn parse(line: &str) -> Result<Self, SshKeyError> {
        let mut parts = line.split_whitespace();
        let algorithm_token = parts
            .next()
            .ok_or_else(|| SshKeyError::malformed_line("empty key line"))?;
        let key_data = parts
            .next()
            .ok_or_else(|| SshKeyError::malformed_line("missing key data after algorithm"))?;

        let algorithm: KeyAlgorithm = algorithm_token.parse()?;

        let rest: Vec<&str> = parts.collect();
        let comment = if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        };

        Ok(Self {
            algorithm,
            key_data: key_data.to_string(),
            comment,
        })
    }
}

impl std::fmt::Display for SshPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.comment {
            Some(comment) => write!(f, "{} {} {comment}", self.algorithm, self.key_data),
            None => write!(f, "{} {}", self.algorithm, self.key_data),
        }
    }
}

/// Check whether a line satisfies the authorized_keys grammar.
///
/// A valid line has at least two whitespace-separated tokens and its first
/// token, lowercased, names an accepted algorithm. Leading and trailing
/// whitespace is ignored.
pub fn is_valid_key_line(line: &str) -> bool {
    SshPublicKey::parse(line).is_ok()
}

/// Check whether a string is a plausible GitHub username.
///
/// Accepts 1 to 39 characters, alphanumeric or hyphen, with no leading or
/// trailing hyphen.
pub fn is_valid_github_username(username: &str) -> bool {
    if username.is_empty() || username.chars().count() > 39 {
        return false;
    }
    if username.starts_with('-') || username.ends_with('-') {
        return false;
    }
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
}
