//! Result type definition and extension traits.
//!
//! Provides combinators for Result types so per-item failures can be logged
//! and skipped without unwrap/expect/panic.

use std::fmt::Display;

use crate::error::Error;

/// The standard Result type for core model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logging combinators for Results.
pub trait ResultExt<T, E> {
    /// Convert a Result to an Option, logging the error as a warning.
    fn into_option_logged(self, operation: &str) -> Option<T>;
}

impl<T, E: Display> ResultExt<T, E> for std::result::Result<T, E> {
    fn into_option_logged(self, operation: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(operation, error = %e, "Operation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_option_logged_keeps_value() {
        let result: Result<u32> = Ok(7);
        assert_eq!(result.into_option_logged("read"), Some(7));
    }

    #[test]
    fn test_into_option_logged_drops_error() {
        let result: Result<u32> = Err(Error::invalid_argument("uri", "blank"));
        assert_eq!(result.into_option_logged("read"), None);
    }
}
