//! Identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw value.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the value is empty or whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Storage key of an application record.
    ApplicationId
);
string_id!(
    /// Storage key of an endpoint record.
    EndpointId
);
string_id!(
    /// Identity of a discovery agent.
    DiscovererId
);
string_id!(
    /// Identity of a site (network segment / gateway scope).
    SiteId
);
string_id!(
    /// Identity of the supervisor hosting a discoverer.
    SupervisorId
);
string_id!(
    /// Opaque concurrency token; changes on every successful write.
    GenerationId
);

impl ApplicationId {
    /// Generate a fresh random id, used when a caller-preset id collides.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string().to_lowercase())
    }
}

impl GenerationId {
    /// Generate a fresh generation token.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}
