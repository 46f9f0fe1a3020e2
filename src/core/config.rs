//! # Configuration Module
//!
//! This module handles loading and validation of the synchronization layer's
//! configuration.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Human readable durations (`"5m"`, `"300ms"`) via `humantime_serde`
//! - Environment variable override support
//! - Validation with every problem reported at once

use crate::caching::policy::PolicyTable;
use crate::caching::store::StoreConfig;
use crate::core::error::{SyncError, SyncResult};
use crate::observability::logging::{LogConfig, LogFormat};
use crate::prefetch::plan::PrefetchConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "STOREFRONT_SYNC";

/// Main configuration structure
///
/// Every section is optional in the file; missing sections keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Staleness tiers
    pub staleness: PolicyTable,

    /// Cache store settings
    pub store: StoreConfig,

    /// Prefetch scheduler settings
    pub prefetch: PrefetchConfig,

    /// Logging settings
    pub logging: LogConfig,
}

impl SyncConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| SyncError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: SyncConfig = serde_yaml::from_str(&content)
            .map_err(|e| SyncError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| SyncError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: SyncConfig = serde_json::from_str(&content)
            .map_err(|e| SyncError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML or JSON file, chosen by extension
    pub async fn load<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let is_json = path.as_ref().extension().and_then(|ext| ext.to_str()) == Some("json");
        if is_json {
            Self::load_from_json(path).await
        } else {
            Self::load_from_file(path).await
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> SyncResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> SyncResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{}_{}", ENV_PREFIX, suffix);
            lookup(&name).map(|value| (name, value))
        };
        let duration = |name: &str, value: &str| {
            humantime::parse_duration(value)
                .map_err(|e| SyncError::config(format!("Invalid {}: {}", name, e)))
        };

        // Logging configuration overrides
        if let Some((_, level)) = var("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some((_, format)) = var("LOG_FORMAT") {
            self.logging.format = format.parse::<LogFormat>()?;
        }

        // Prefetch configuration overrides
        if let Some((name, enabled)) = var("PREFETCH_ENABLED") {
            self.prefetch.enabled = enabled
                .parse()
                .map_err(|e| SyncError::config(format!("Invalid {}: {}", name, e)))?;
        }

        if let Some((name, delay)) = var("PREFETCH_MEDIUM_DELAY") {
            self.prefetch.medium_delay = duration(&name, &delay)?;
        }

        if let Some((name, delay)) = var("PREFETCH_LOW_DELAY") {
            self.prefetch.low_delay = duration(&name, &delay)?;
        }

        // Store configuration overrides
        if let Some((name, window)) = var("ERROR_STALE_WINDOW") {
            self.store.error_stale_window = duration(&name, &window)?;
        }

        if let Some((name, interval)) = var("GC_INTERVAL") {
            self.store.gc_interval = duration(&name, &interval)?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> SyncResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.staleness.validate() {
            errors.push(e.to_string());
        }

        if self.store.gc_interval.is_zero() {
            errors.push("store.gc_interval must be greater than 0".to_string());
        }

        if self.prefetch.medium_delay > self.prefetch.low_delay {
            errors.push(format!(
                "prefetch.medium_delay ({:?}) must not exceed prefetch.low_delay ({:?})",
                self.prefetch.medium_delay, self.prefetch.low_delay
            ));
        }

        if let Err(e) = self.logging.parse_level() {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SyncError::config(format!(
                "Configuration validation failed: {}",
                errors.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::policy::{RefetchOnMount, TierName};
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.prefetch.enabled);
        assert_eq!(config.store.error_stale_window, Duration::from_secs(5));
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
staleness:
  dynamic:
    stale_window: 10s
    gc_window: 2m
    refetch_on_focus: false
    refetch_on_mount: always
prefetch:
  enabled: true
  medium_delay: 250ms
  low_delay: 1s
"#;
        let config: SyncConfig = serde_yaml::from_str(yaml).unwrap();
        let dynamic = config.staleness.tier(TierName::Dynamic);
        assert_eq!(dynamic.stale_window, Duration::from_secs(10));
        assert_eq!(dynamic.refetch_on_mount, RefetchOnMount::Always);
        assert_eq!(config.prefetch.medium_delay, Duration::from_millis(250));
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STOREFRONT_SYNC_LOG_LEVEL", "debug"),
            ("STOREFRONT_SYNC_LOG_FORMAT", "json"),
            ("STOREFRONT_SYNC_PREFETCH_ENABLED", "false"),
            ("STOREFRONT_SYNC_PREFETCH_MEDIUM_DELAY", "200ms"),
            ("STOREFRONT_SYNC_ERROR_STALE_WINDOW", "2s"),
        ]);

        let mut config = SyncConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.prefetch.enabled);
        assert_eq!(config.prefetch.medium_delay, Duration::from_millis(200));
        assert_eq!(config.prefetch.low_delay, Duration::from_secs(1));
        assert_eq!(config.store.error_stale_window, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_override() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_overrides(|name| {
                (name == "STOREFRONT_SYNC_GC_INTERVAL").then(|| "soon".to_string())
            })
            .unwrap_err();
        assert!(err.to_string().contains("STOREFRONT_SYNC_GC_INTERVAL"));
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = SyncConfig::default();
        config.prefetch.medium_delay = Duration::from_secs(5);
        config.logging.level = "loud".to_string();

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("medium_delay"));
        assert!(message.contains("loud"));
    }
}
