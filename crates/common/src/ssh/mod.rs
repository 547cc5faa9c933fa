//! SSH public key primitives
//!
//! Grammar and parsing for authorized_keys entries plus validation of the
//! identifiers that name key sources. Everything here is pure; network and
//! filesystem effects live in the deployment crate.

pub mod types;

pub use types::*;
