//! Storage status values.
//!
//! Every outcome a caller has to branch on is an explicit variant; the CAS
//! loops in [`crate::Repository`] use the `is_*` classifiers rather than
//! matching on messages.

use std::fmt::Display;

use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Registry error and status values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No record with this id.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A record with this id already exists.
    #[error("{kind} '{id}' already exists")]
    Conflict { kind: &'static str, id: String },

    /// The record changed since it was read.
    #[error("{kind} '{id}' was modified concurrently")]
    OutOfDate { kind: &'static str, id: String },

    /// Caller supplied an unusable argument or record.
    #[error(transparent)]
    InvalidArgument(#[from] fleet_core::Error),

    /// Backend failure.
    #[error("storage error: {reason}")]
    Storage { reason: String },
}

impl RegistryError {
    /// Create a not found status.
    pub fn not_found(kind: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a conflict status.
    pub fn conflict(kind: &'static str, id: impl Display) -> Self {
        Self::Conflict {
            kind,
            id: id.to_string(),
        }
    }

    /// Create an out-of-date status.
    pub fn out_of_date(kind: &'static str, id: impl Display) -> Self {
        Self::OutOfDate {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a storage error.
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument(fleet_core::Error::invalid_argument(name, reason))
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub const fn is_out_of_date(&self) -> bool {
        matches!(self, Self::OutOfDate { .. })
    }
}
