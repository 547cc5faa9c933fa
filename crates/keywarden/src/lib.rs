//! # Keywarden
//!
//! SSH public-key distribution and access reconciliation. Keywarden gathers
//! candidate keys from manual lists, GitHub accounts, arbitrary URL
//! endpoints, and a remote key registry, validates them against the
//! authorized_keys grammar, and reconciles each target account's
//! authorized_keys file to the desired set.
//!
//! ## Components
//! - [`jobs`]: deployment job definitions and batch validation
//! - [`sources`]: key fetching from GitHub and URL endpoints with retries
//! - [`aggregate`]: merging of manual and fetched keys in declaration order
//! - [`registry`]: authenticated, caching client for the key registry API
//! - [`reconcile`]: reconciliation engine and authorized_keys writers
//! - [`runner`]: concurrent execution of job batches
//! - [`cli`]: command-line interface

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod jobs;
pub mod reconcile;
pub mod registry;
pub mod runner;
pub mod sources;

pub use config::KeywardenConfig;
pub use runner::JobRunner;

/// User agent sent with every outbound HTTP request.
pub(crate) const USER_AGENT: &str = concat!("keywarden/", env!("CARGO_PKG_VERSION"));
