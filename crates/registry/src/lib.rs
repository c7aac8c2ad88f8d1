//! Registry storage with optimistic concurrency.
//!
//! - **Store contract**: [`DocumentStore`], the versioned primitive a backend
//!   provides, plus [`InMemoryStore`]
//! - **Repository**: [`Repository`], compare-and-swap retry loops over any store
//! - **Service**: [`ApplicationRegistry`], explicit registration and lookup
//!
//! Contention is reported as [`RegistryError`] status values, never panics.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod cascade;
pub mod error;
pub mod memory;
pub mod query;
pub mod repository;
pub mod service;
pub mod store;

pub use error::{RegistryError, Result};
pub use memory::InMemoryStore;
pub use query::{
    ApplicationFilter, ContinuationToken, EndpointFilter, EntityFilter, MatchAll, Page,
    PresenceFilter,
};
pub use repository::Repository;
pub use service::ApplicationRegistry;
pub use store::DocumentStore;
