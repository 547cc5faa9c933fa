//! CLI command handlers

use std::path::Path;

use anyhow::Result;

use crate::config::KeywardenConfig;

pub mod jobs;
pub mod registry;

/// Common handler utilities
pub struct HandlerUtils;

impl HandlerUtils {
    /// Load configuration, falling back to discovery when the given path
    /// does not exist.
    pub fn load_config(config_path: &str) -> Result<KeywardenConfig> {
        let path = Path::new(config_path);
        let config = if path.exists() {
            KeywardenConfig::load_from_file(path)?
        } else {
            KeywardenConfig::load(None)?
        };
        Ok(config)
    }

    /// Print success message
    pub fn print_success(message: &str) {
        println!("[SUCCESS] {message}");
    }

    /// Print error message
    pub fn print_error(message: &str) {
        eprintln!("[ERROR] {message}");
    }

    /// Print info message
    pub fn print_info(message: &str) {
        println!("[INFO] {message}");
    }

    /// Print warning message
    pub fn print_warning(message: &str) {
        println!("[WARNING] {message}");
    }
}
