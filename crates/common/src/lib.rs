//! # Keywarden Common
//!
//! Shared building blocks for the Keywarden crates. This crate provides the
//! fundamental primitives that the deployment crates depend on.
//!
//! ## Key Features
//! - Comprehensive error handling with the KeywardenError trait
//! - Layered configuration loading (defaults, TOML file, environment)
//! - Reusable retry policy for transient network failures
//! - SSH public key grammar, parsing, and identifier validation
//!
//! ## Design Principles
//! - Minimal dependencies to avoid bloat in dependent crates
//! - Strong typing with validation logic
//! - Explicit error propagation instead of panics
//! - No global state; collaborators are constructed and passed in

pub mod config;
pub mod error;
pub mod retry;
pub mod ssh;

// Re-export commonly used types at the crate root for convenience
pub use config::*;
pub use error::*;

/// Version of the common crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
