//! # Configuration Abstractions
//!
//! Layered configuration loading and the validation trait shared across
//! all Keywarden components.

pub mod loader;

// Re-export commonly used types
pub use loader::*;

use crate::error::KeywardenError;

/// Common configuration validation trait
///
/// Implemented by every top-level configuration struct. `validate` rejects
/// values the process cannot run with; `warnings` surfaces non-fatal issues
/// worth logging at startup.
pub trait ConfigValidation {
    type Error: KeywardenError;

    /// Validate the configuration
    fn validate(&self) -> Result<(), Self::Error>;

    /// Get configuration warnings (non-fatal issues)
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}
