//! Event broker: fan-out of registry events to listeners.
//!
//! Listeners register for a pattern that is expanded once, at registration,
//! into the concrete type tags it covers. Delivery looks the event's tag up in
//! that table; nothing inspects event types at delivery time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::RegistryEvent;
use crate::listener::RegistryListener;
use crate::types::{all_tags, EventKind, ListenerId, SubjectKind};

/// Broker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Capacity of the broadcast channel behind `subscribe()`.
    pub channel_capacity: usize,
    /// Consecutive failures after which a listener is reported degraded.
    pub failure_threshold: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            failure_threshold: 5,
        }
    }
}

impl BrokerConfig {
    /// Check the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero channel capacity or threshold.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::invalid_config("channel_capacity must be > 0"));
        }
        if self.failure_threshold == 0 {
            return Err(Error::invalid_config("failure_threshold must be > 0"));
        }
        Ok(())
    }
}

/// Consecutive-failure tracking for one listener.
///
/// Health is reported, never enforced: a degraded listener still receives
/// every event, and its first success clears the streak.
pub struct ListenerHealth {
    consecutive_failures: AtomicU32,
    threshold: u32,
}

impl ListenerHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            threshold,
        }
    }

    /// Record a successful delivery.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a failed delivery and return the new streak length.
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    /// Failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// True once the streak has reached the threshold.
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures() >= self.threshold
    }
}

/// Pattern selecting which events a listener receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPattern {
    /// Match all events.
    All,
    /// Match one lifecycle kind for every subject.
    ByKind(EventKind),
    /// Match every event about one subject kind.
    BySubject(SubjectKind),
    /// Match events by type tag.
    ByType(String),
    /// Match events by several type tags.
    ByTypes(Vec<String>),
}

impl EventPattern {
    /// Check if a tag is covered by this pattern.
    pub fn matches(&self, subject: SubjectKind, kind: EventKind, tag: &str) -> bool {
        match self {
            Self::All => true,
            Self::ByKind(k) => *k == kind,
            Self::BySubject(s) => *s == subject,
            Self::ByType(t) => t == tag,
            Self::ByTypes(types) => types.iter().any(|t| t == tag),
        }
    }

    /// Concrete tags this pattern expands to.
    pub fn tags(&self) -> Vec<&'static str> {
        all_tags()
            .filter(|(subject, kind, tag)| self.matches(*subject, *kind, tag))
            .map(|(_, _, tag)| tag)
            .collect()
    }
}

/// Outcome of one `notify_all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Registration {
    id: ListenerId,
    listener: Arc<dyn RegistryListener>,
    health: ListenerHealth,
}

#[derive(Default)]
struct Routes {
    table: HashMap<&'static str, Vec<Arc<Registration>>>,
}

/// Subscription handle for receiving events.
pub struct EventSubscription {
    receiver: broadcast::Receiver<RegistryEvent>,
}

impl EventSubscription {
    /// Receive the next event.
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` when the broker is gone or the receiver lagged.
    pub async fn recv(&mut self) -> Result<RegistryEvent> {
        self.receiver.recv().await.map_err(|_| Error::ChannelClosed)
    }

    /// Try to receive an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` when nothing is queued.
    pub fn try_recv(&mut self) -> Result<RegistryEvent> {
        self.receiver.try_recv().map_err(|_| Error::ChannelClosed)
    }
}

/// Fan-out of registry events to registered listeners and subscribers.
pub struct EventBroker {
    broadcast: broadcast::Sender<RegistryEvent>,
    routes: RwLock<Routes>,
    next_id: AtomicU64,
    config: BrokerConfig,
}

impl EventBroker {
    /// Create a broker with default settings.
    pub fn new() -> Self {
        Self::build(BrokerConfig::default())
    }

    /// Create a broker from settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the settings do not validate.
    pub fn from_config(config: BrokerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BrokerConfig) -> Self {
        let (broadcast, _) = broadcast::channel(config.channel_capacity);
        Self {
            broadcast,
            routes: RwLock::new(Routes::default()),
            next_id: AtomicU64::new(0),
            config,
        }
    }

    /// Register a listener for every event matching `pattern`.
    pub async fn register(
        &self,
        listener: Arc<dyn RegistryListener>,
        pattern: EventPattern,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            id,
            listener,
            health: ListenerHealth::new(self.config.failure_threshold),
        });

        let tags = pattern.tags();
        debug!(listener_id = %id, listener = registration.listener.name(), tags = tags.len(), "Registering listener");

        let mut routes = self.routes.write().await;
        for tag in tags {
            routes
                .table
                .entry(tag)
                .or_default()
                .push(Arc::clone(&registration));
        }
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub async fn unregister(&self, id: ListenerId) -> bool {
        let mut routes = self.routes.write().await;
        let mut removed = false;
        for registrations in routes.table.values_mut() {
            let before = registrations.len();
            registrations.retain(|r| r.id != id);
            removed |= registrations.len() != before;
        }
        removed
    }

    /// Failures of a listener since its last successful delivery, or `None`
    /// if it is not registered.
    pub async fn consecutive_failures(&self, id: ListenerId) -> Option<u32> {
        let routes = self.routes.read().await;
        routes
            .table
            .values()
            .flatten()
            .find(|r| r.id == id)
            .map(|r| r.health.consecutive_failures())
    }

    /// Listeners whose failure streak has reached the threshold.
    pub async fn degraded_listeners(&self) -> Vec<ListenerId> {
        let routes = self.routes.read().await;
        let mut degraded: Vec<ListenerId> = routes
            .table
            .values()
            .flatten()
            .filter(|r| r.health.is_degraded())
            .map(|r| r.id)
            .collect();
        degraded.sort_unstable();
        degraded.dedup();
        degraded
    }

    /// Subscribe to all events through a broadcast channel.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.broadcast.subscribe(),
        }
    }

    /// Deliver an event to every listener registered for its tag.
    ///
    /// Listeners run concurrently; a failing or slow listener never prevents
    /// delivery to the others and never fails the caller.
    pub async fn notify_all(&self, event: RegistryEvent) -> DeliveryReport {
        let tag = event.event_type();
        let targets = {
            let routes = self.routes.read().await;
            routes.table.get(tag).cloned().unwrap_or_default()
        };

        debug!(
            event_id = %event.event_id,
            event_type = tag,
            subject_id = event.subject_id(),
            listeners = targets.len(),
            "Publishing event"
        );

        let outcomes = join_all(targets.iter().map(|r| Self::deliver(r, &event))).await;

        // No subscribers is not an error.
        let _ = self.broadcast.send(event);

        outcomes
            .into_iter()
            .fold(DeliveryReport::default(), |mut report, delivered| {
                if delivered {
                    report.delivered = report.delivered.saturating_add(1);
                } else {
                    report.failed = report.failed.saturating_add(1);
                }
                report
            })
    }

    async fn deliver(registration: &Registration, event: &RegistryEvent) -> bool {
        match registration.listener.on_event(event).await {
            Ok(()) => {
                registration.health.record_success();
                true
            }
            Err(e) => {
                let failures = registration.health.record_failure();
                warn!(
                    listener = registration.listener.name(),
                    event_type = event.event_type(),
                    subject_id = event.subject_id(),
                    failures,
                    degraded = registration.health.is_degraded(),
                    error = %e,
                    "Listener failed to handle event"
                );
                false
            }
        }
    }

    /// Broker settings.
    pub const fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `EventBroker`.
pub struct EventBrokerBuilder {
    config: BrokerConfig,
}

impl EventBrokerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: BrokerConfig::default(),
        }
    }

    /// Use a full configuration.
    #[must_use]
    pub fn with_config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the broadcast channel capacity.
    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the failure streak at which a listener is reported degraded.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Build the broker.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the settings do not validate.
    pub fn build(self) -> Result<EventBroker> {
        EventBroker::from_config(self.config)
    }
}

impl Default for EventBrokerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
