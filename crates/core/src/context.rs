//! Operation context stamped on every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who did something, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    /// Time of the operation.
    pub time: DateTime<Utc>,
    /// Acting authority (user, service or discoverer id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<String>,
}

impl OperationContext {
    /// Context for an operation happening now.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Context for an operation at a fixed time.
    pub const fn at(time: DateTime<Utc>) -> Self {
        Self {
            time,
            authority_id: None,
        }
    }

    /// Set the acting authority.
    #[must_use]
    pub fn with_authority(mut self, authority_id: impl Into<String>) -> Self {
        self.authority_id = Some(authority_id.into());
        self
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::now()
    }
}
