//! # Storefront Sync - Configuration Check
//!
//! Loads the synchronization layer's configuration the same way a storefront does,
//! validates it, and prints the effective staleness tier table as YAML. Useful when
//! tuning tiers.
//!
//! The configuration file is taken from `STOREFRONT_SYNC_CONFIG`
//! (default `config/storefront-sync.yaml`); defaults are used when it does not exist.
//! `STOREFRONT_SYNC_*` environment variables override individual settings.

use std::path::Path;
use tracing::{error, info, warn};

use storefront_sync::observability::init_logging;
use storefront_sync::{SyncConfig, SyncError, SyncResult};

const DEFAULT_CONFIG_PATH: &str = "config/storefront-sync.yaml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("storefront-sync failed: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> SyncResult<()> {
    let config = load_config().await?;
    init_logging(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Configuration loaded and validated");

    let table = serde_yaml::to_string(&config.staleness)
        .map_err(|e| SyncError::config(format!("Failed to render staleness table: {}", e)))?;
    println!("{}", table);
    Ok(())
}

async fn load_config() -> SyncResult<SyncConfig> {
    let config_path = std::env::var("STOREFRONT_SYNC_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    if Path::new(&config_path).exists() {
        return SyncConfig::load(&config_path).await;
    }

    warn!(path = %config_path, "Config file not found, using defaults");
    let mut config = SyncConfig::default();
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}
