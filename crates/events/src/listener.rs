//! Listener trait and stock listeners.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::event::RegistryEvent;
use crate::types::EventKind;

/// Receiver of registry lifecycle notifications.
#[async_trait]
pub trait RegistryListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one event. Errors are logged by the broker and never reach the
    /// mutation that caused the event.
    async fn on_event(&self, event: &RegistryEvent) -> Result<()>;
}

/// Listener that keeps every event it receives, in delivery order.
#[derive(Default)]
pub struct RecordingListener {
    events: RwLock<Vec<RegistryEvent>>,
}

impl RecordingListener {
    /// Create an empty recording listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of received events.
    pub async fn events(&self) -> Vec<RegistryEvent> {
        self.events.read().await.clone()
    }

    /// Number of events of `kind` about the record `subject_id`.
    pub async fn count(&self, kind: EventKind, subject_id: &str) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind && e.subject_id() == subject_id)
            .count()
    }

    /// Number of events with the given type tag.
    pub async fn count_type(&self, event_type: &str) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Forget everything received so far.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl RegistryListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_event(&self, event: &RegistryEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// Listener that writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

#[async_trait]
impl RegistryListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn on_event(&self, event: &RegistryEvent) -> Result<()> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = event.event_type(),
            subject_id = event.subject_id(),
            authority = event.context.authority_id.as_deref().unwrap_or("-"),
            "Registry event"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!(payload = %event.to_json()?, "Registry event payload");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use fleet_core::{Application, OperationContext};

    use super::*;
    use crate::bus::{EventBroker, EventPattern};

    fn lost_press() -> RegistryEvent {
        let mut app = Application::new("urn:press");
        app.id = app.derive_id();
        RegistryEvent::new(
            EventKind::Lost,
            app,
            OperationContext::now().with_authority("d1"),
        )
    }

    #[tokio::test]
    async fn should_record_events_by_kind_and_subject() -> Result<()> {
        let recorder = RecordingListener::new();
        let event = lost_press();
        let subject = event.subject_id().to_string();

        recorder.on_event(&event).await?;

        assert_eq!(recorder.count(EventKind::Lost, &subject).await, 1);
        assert_eq!(recorder.count(EventKind::Found, &subject).await, 0);
        assert_eq!(recorder.count_type("application.lost").await, 1);
        recorder.clear().await;
        assert!(recorder.events().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn should_log_event_with_payload_at_trace() -> Result<()> {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        TracingListener.on_event(&lost_press()).await
    }

    #[tokio::test]
    async fn should_accept_tracing_listener_on_broker() {
        let broker = EventBroker::new();
        broker
            .register(Arc::new(TracingListener), EventPattern::All)
            .await;

        let report = broker.notify_all(lost_press()).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
    }
}
