//! Discovery reconciliation for the fleet registry.
//!
//! A discoverer periodically reports the applications and endpoints it can
//! see. This crate merges each report into the registry:
//!
//! - **Processing**: [`DiscoveryResultProcessor`] scopes a result to the
//!   discoverer's site and merges discovery settings
//! - **Reconciliation**: [`ApplicationReconciler`] partitions observations
//!   against registered applications, then loses, adds and re-finds them,
//!   delegating endpoints to an [`EndpointReconciler`]
//! - **Retention**: [`PurgeSweeper`] deletes applications lost for too long
//!
//! Every write goes through the registry's compare-and-swap repository and
//! every change is announced on the event broker.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fleet_reconciler::{ApplicationReconcilerBuilder, RegistryEndpointReconciler};
//!
//! let broker = Arc::new(EventBroker::new());
//! let reconciler = ApplicationReconcilerBuilder::new()
//!     .with_applications(Repository::in_memory())
//!     .with_endpoint_reconciler(Arc::new(RegistryEndpointReconciler::new(
//!         Repository::in_memory(),
//!         broker.clone(),
//!     )))
//!     .with_broker(broker)
//!     .build()?;
//!
//! let report = reconciler.reconcile(&scope, &context, false, events).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod diff;
pub mod endpoints;
pub mod error;
pub mod mutations;
pub mod processor;
pub mod purge;
pub mod reconciler;
pub mod telemetry;
pub mod types;

pub use config::FleetConfig;
pub use endpoints::{EndpointReconciler, RegistryEndpointReconciler};
pub use error::{Error, Result};
pub use processor::{
    DiscoveryResultProcessor, GatewayInfo, GatewayLookup, InMemoryGatewayLookup,
    ProcessedDiscovery,
};
pub use purge::{PurgeConfig, PurgeReport, PurgeSweeper};
pub use reconciler::{ApplicationReconciler, ApplicationReconcilerBuilder, ReconcilerConfig};
pub use telemetry::init_tracing;
pub use types::{
    DiscoveryConfig, DiscoveryEvent, DiscoveryResult, DiscoveryScope, Outcome, ReconcileCounters,
    ReconcileReport,
};
