//! Error types for the events crate.

use thiserror::Error;

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Event error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A listener rejected or failed to handle an event.
    #[error("listener '{listener}' failed: {reason}")]
    ListenerFailed { listener: String, reason: String },

    /// Subscription channel closed or lagged.
    #[error("event channel closed")]
    ChannelClosed,

    /// Broker configuration is unusable.
    #[error("invalid broker configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Event could not be serialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl Error {
    /// Create a listener failed error.
    pub fn listener_failed(listener: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ListenerFailed {
            listener: listener.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }
}
