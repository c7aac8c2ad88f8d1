//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// Only caller mistakes and unreadable state surface here. Per-entity
/// failures during a pass are logged and counted, never returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid caller input.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Model validation failed.
    #[error(transparent)]
    Model(#[from] fleet_core::Error),

    /// Registry access failed.
    #[error(transparent)]
    Registry(#[from] fleet_registry::RegistryError),

    /// Event broker setup failed.
    #[error(transparent)]
    Events(#[from] fleet_events::Error),

    /// Gateway lookup failed.
    #[error("gateway lookup for '{discoverer_id}' failed: {reason}")]
    GatewayLookup {
        discoverer_id: String,
        reason: String,
    },
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a gateway lookup error.
    pub fn gateway_lookup(discoverer_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GatewayLookup {
            discoverer_id: discoverer_id.into(),
            reason: reason.into(),
        }
    }
}
