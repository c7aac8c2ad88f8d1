//! Shared fixture for reconciler integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use fleet_core::{Application, ApplicationId, Endpoint, EndpointId, OperationContext};
use fleet_events::{EventBroker, EventPattern, RecordingListener};
use fleet_reconciler::{
    ApplicationReconciler, ApplicationReconcilerBuilder, DiscoveryEvent, DiscoveryScope,
    ReconcileReport, RegistryEndpointReconciler, Result,
};
use fleet_registry::{DocumentStore, InMemoryStore, MatchAll, Repository};

/// Registry, broker and reconciler wired over in-memory stores.
pub struct Fleet {
    pub applications: Repository<Application>,
    pub endpoints: Repository<Endpoint>,
    pub broker: Arc<EventBroker>,
    pub recorder: Arc<RecordingListener>,
    pub reconciler: Arc<ApplicationReconciler>,
}

impl Fleet {
    pub async fn new() -> Self {
        let store: Arc<dyn DocumentStore<Application>> = Arc::new(InMemoryStore::<Application>::new());
        Self::over(store).await
    }

    /// Build the fleet over a caller-provided application store.
    pub async fn over(store: Arc<dyn DocumentStore<Application>>) -> Self {
        let broker = Arc::new(EventBroker::new());
        let recorder = Arc::new(RecordingListener::new());
        broker.register(recorder.clone(), EventPattern::All).await;

        let applications = Repository::new(store);
        let endpoints: Repository<Endpoint> = Repository::in_memory();
        let reconciler = ApplicationReconcilerBuilder::new()
            .with_applications(applications.clone())
            .with_endpoint_reconciler(Arc::new(RegistryEndpointReconciler::new(
                endpoints.clone(),
                Arc::clone(&broker),
            )))
            .with_broker(Arc::clone(&broker))
            .build()
            .expect("valid reconciler");

        Self {
            applications,
            endpoints,
            broker,
            recorder,
            reconciler: Arc::new(reconciler),
        }
    }

    /// Run one full pass.
    pub async fn pass(
        &self,
        scope: &DiscoveryScope,
        at: &OperationContext,
        events: Vec<DiscoveryEvent>,
    ) -> Result<ReconcileReport> {
        self.reconciler.reconcile(scope, at, false, events).await
    }

    /// Run one register-only pass.
    pub async fn register_only(
        &self,
        scope: &DiscoveryScope,
        at: &OperationContext,
        events: Vec<DiscoveryEvent>,
    ) -> Result<ReconcileReport> {
        self.reconciler.reconcile(scope, at, true, events).await
    }

    pub async fn application(&self, id: &ApplicationId) -> Option<Application> {
        self.applications.find(id).await.unwrap()
    }

    pub async fn endpoint(&self, id: &EndpointId) -> Option<Endpoint> {
        self.endpoints.find(id).await.unwrap()
    }

    pub async fn all_applications(&self) -> Vec<Application> {
        self.applications.query_all(&MatchAll).await.unwrap()
    }

    pub async fn all_endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.query_all(&MatchAll).await.unwrap()
    }
}

/// Fixed clock: `minutes` after a base instant.
pub fn at(minutes: i64) -> OperationContext {
    OperationContext::at(base() + Duration::minutes(minutes)).with_authority("test")
}

pub fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

/// Observations of one application, one event per endpoint URL (or a single
/// bare event when there are none).
pub fn observe(uri: &str, urls: &[&str]) -> Vec<DiscoveryEvent> {
    let app = Application::new(uri).with_name(uri.trim_start_matches("urn:"));
    if urls.is_empty() {
        return vec![DiscoveryEvent::new(app)];
    }
    urls.iter()
        .map(|url| DiscoveryEvent::new(app.clone()).with_endpoint(Endpoint::new(*url)))
        .collect()
}

/// Concatenate observations and number them.
pub fn pass_of(groups: Vec<Vec<DiscoveryEvent>>) -> Vec<DiscoveryEvent> {
    groups
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(i, event)| event.with_index(i))
        .collect()
}

/// Id the registry assigns to `uri` observed under `scope`.
pub fn app_id(scope: &DiscoveryScope, uri: &str) -> ApplicationId {
    let mut app = Application::new(uri).with_discoverer(scope.discoverer_id.clone());
    app.site_id.clone_from(&scope.site_id);
    app.derive_id()
}

/// Id the registry assigns to endpoint `url` of `uri` observed under `scope`.
pub fn endpoint_id(scope: &DiscoveryScope, uri: &str, url: &str) -> EndpointId {
    Endpoint::new(url)
        .owned_by(&app_id(scope, uri), scope.site_id.as_ref(), &scope.discoverer_id)
        .id
}
