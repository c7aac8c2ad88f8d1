//! Configuration for the reconciliation core.
//!
//! Settings come from a TOML (or JSON) file, then `FLEET_*` environment
//! variables override individual fields.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use fleet_events::BrokerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::purge::PurgeConfig;
use crate::reconciler::ReconcilerConfig;

pub const ENV_MAX_CONCURRENT_MUTATIONS: &str = "FLEET_RECONCILER_MAX_CONCURRENT_MUTATIONS";
pub const ENV_QUERY_PAGE_SIZE: &str = "FLEET_RECONCILER_QUERY_PAGE_SIZE";
pub const ENV_PURGE_PAGE_SIZE: &str = "FLEET_PURGE_PAGE_SIZE";
pub const ENV_PURGE_RETENTION_SECS: &str = "FLEET_PURGE_RETENTION_SECS";
pub const ENV_CHANNEL_CAPACITY: &str = "FLEET_EVENTS_CHANNEL_CAPACITY";
pub const ENV_FAILURE_THRESHOLD: &str = "FLEET_EVENTS_FAILURE_THRESHOLD";

/// Top-level settings, one table per component.
///
/// ```toml
/// [reconciler]
/// max_concurrent_mutations = 16
///
/// [purge]
/// retention = 86400
///
/// [events]
/// failure_threshold = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub reconciler: ReconcilerConfig,
    pub purge: PurgeConfig,
    pub events: BrokerConfig,
}

impl FleetConfig {
    /// Parse TOML. Missing tables and keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text does not parse or the values are
    /// out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::invalid_config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file. `.json` files are read as JSON,
    /// anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("Failed to read {}: {e}", path.display()))
        })?;

        if path.extension().is_some_and(|e| e == "json") {
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| Error::invalid_config(format!("Failed to parse config: {e}")))?;
            config.validate()?;
            Ok(config)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// See [`FleetConfig::apply_overrides`].
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by the `FLEET_*` names above.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a value does not parse or the result is
    /// out of range.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parsed(&lookup, ENV_MAX_CONCURRENT_MUTATIONS)? {
            self.reconciler.max_concurrent_mutations = v;
        }
        if let Some(v) = parsed(&lookup, ENV_QUERY_PAGE_SIZE)? {
            self.reconciler.query_page_size = v;
        }
        if let Some(v) = parsed(&lookup, ENV_PURGE_PAGE_SIZE)? {
            self.purge.page_size = v;
        }
        if let Some(secs) = parsed(&lookup, ENV_PURGE_RETENTION_SECS)? {
            self.purge.retention = Duration::from_secs(secs);
        }
        if let Some(v) = parsed(&lookup, ENV_CHANNEL_CAPACITY)? {
            self.events.channel_capacity = v;
        }
        if let Some(v) = parsed(&lookup, ENV_FAILURE_THRESHOLD)? {
            self.events.failure_threshold = v;
        }
        self.validate()
    }

    /// Check every component's settings.
    ///
    /// # Errors
    ///
    /// Returns the first `InvalidConfig` found.
    pub fn validate(&self) -> Result<()> {
        self.reconciler.validate()?;
        self.purge.validate()?;
        self.events
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::invalid_config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
