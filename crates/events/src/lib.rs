//! Registry lifecycle events.
//!
//! Every state-changing registry mutation produces a [`RegistryEvent`]
//! (`New`, `Updated`, `Found`, `Lost` or `Deleted`) which the
//! [`EventBroker`] fans out to registered listeners and broadcast
//! subscribers. Delivery is best-effort: a failing listener is logged,
//! counted by its circuit breaker and never fails the mutation.
//!
//! # Example
//!
//! ```ignore
//! use fleet_events::{EventBroker, EventPattern, EventKind, RecordingListener};
//! use std::sync::Arc;
//!
//! let broker = EventBroker::new();
//! let recorder = Arc::new(RecordingListener::new());
//! broker.register(recorder.clone(), EventPattern::ByKind(EventKind::Lost)).await;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bus;
pub mod error;
pub mod event;
pub mod listener;
pub mod types;

pub use bus::{
    BrokerConfig, DeliveryReport, EventBroker, EventBrokerBuilder, EventPattern, EventSubscription,
    ListenerHealth,
};
pub use error::{Error, Result};
pub use event::{RegistryEvent, Subject};
pub use listener::{RecordingListener, RegistryListener, TracingListener};
pub use types::{event_tag, EventId, EventKind, ListenerId, SubjectKind};
