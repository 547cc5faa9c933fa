//! Registry command handlers

use anyhow::Result;

use super::HandlerUtils;
use crate::cli::CliContext;
use crate::registry::{provider_from_config, KeyRegistryClient};

/// Handle the list-keys command.
pub async fn handle_list_keys(force_refresh: bool, context: &CliContext) -> Result<()> {
    let config = HandlerUtils::load_config(&context.config_path)?;
    let provider = provider_from_config(&config.registry);
    let client = KeyRegistryClient::new(&config.registry, provider)?;

    let keys = client.fetch_managed_keys(force_refresh).await?;
    if keys.is_empty() {
        HandlerUtils::print_warning("Key registry returned no keys");
        return Ok(());
    }

    HandlerUtils::print_info(&format!("{} managed key(s):", keys.len()));
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

/// Handle the clear-cache command.
///
/// Sessions and the key cache live in process memory, so this matters for
/// library consumers and long-lived shells; a fresh process always starts
/// cold.
pub async fn handle_clear_cache(context: &CliContext) -> Result<()> {
    let config = HandlerUtils::load_config(&context.config_path)?;
    let provider = provider_from_config(&config.registry);
    let client = KeyRegistryClient::new(&config.registry, provider)?;

    client.clear_cache().await;
    HandlerUtils::print_info("Registry session and key cache cleared");
    Ok(())
}
