//! Core model for the fleet registry.
//!
//! - **Records**: [`Application`] and its child [`Endpoint`]
//! - **Identity**: deterministic ids and logical identity keys
//! - **Lifecycle**: pure lost/found transitions and patch-merge semantics
//!
//! Nothing in this crate performs I/O; storage and notification live in
//! `fleet-registry` and `fleet-events`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod application;
pub mod context;
pub mod duration_secs;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod identity;
pub mod ids;
pub mod lifecycle;
pub mod patch;
pub mod result;

pub use application::{Application, ApplicationKey, ApplicationType};
pub use context::OperationContext;
pub use endpoint::{Endpoint, EndpointKey, SecurityMode};
pub use entity::{Discoverable, Entity, Patchable};
pub use error::Error;
pub use identity::LogicalIdentity;
pub use ids::{ApplicationId, DiscovererId, EndpointId, GenerationId, SiteId, SupervisorId};
pub use lifecycle::{Change, Presence, Transition};
pub use result::{Result, ResultExt};
