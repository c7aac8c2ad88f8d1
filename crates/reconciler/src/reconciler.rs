//! Application reconciler implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_core::{Application, ApplicationKey, Endpoint, LogicalIdentity, OperationContext};
use fleet_events::EventBroker;
use fleet_registry::{ApplicationFilter, Repository};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::diff::{dedup_by_identity, partition, Partition};
use crate::endpoints::EndpointReconciler;
use crate::error::{Error, Result};
use crate::mutations::{self, for_each_bounded, settle};
use crate::types::{DiscoveryEvent, DiscoveryScope, Outcome, ReconcileCounters, ReconcileReport};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Maximum entity mutations in flight within one step of a pass.
    pub max_concurrent_mutations: usize,
    /// Page size used when loading registered records.
    pub query_page_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_mutations: 8,
            query_page_size: 100,
        }
    }
}

impl ReconcilerConfig {
    /// Check the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for zero limits.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_mutations == 0 {
            return Err(Error::invalid_config("max_concurrent_mutations must be > 0"));
        }
        if self.query_page_size == 0 {
            return Err(Error::invalid_config("query_page_size must be > 0"));
        }
        Ok(())
    }
}

type EndpointsByApplication = BTreeMap<ApplicationKey, Vec<Endpoint>>;

/// Merges one discoverer's observations into the registry.
pub struct ApplicationReconciler {
    applications: Repository<Application>,
    endpoints: Arc<dyn EndpointReconciler>,
    broker: Arc<EventBroker>,
    config: ReconcilerConfig,
}

impl ApplicationReconciler {
    /// Create a new reconciler.
    pub fn new(
        applications: Repository<Application>,
        endpoints: Arc<dyn EndpointReconciler>,
        broker: Arc<EventBroker>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            applications: applications.with_page_size(config.query_page_size),
            endpoints,
            broker,
            config,
        }
    }

    /// Reconcile a discoverer's observations with the registry.
    ///
    /// Applications attributed to the discoverer but not observed are marked
    /// lost (unless `register_only`), observed applications are inserted or
    /// re-found and merged, and each touched application's endpoints are
    /// reconciled. Per-entity failures are logged and counted as unchanged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank discoverer id, or the registry
    /// error if the registered applications cannot be loaded.
    pub async fn reconcile(
        &self,
        scope: &DiscoveryScope,
        context: &OperationContext,
        register_only: bool,
        events: Vec<DiscoveryEvent>,
    ) -> Result<ReconcileReport> {
        if scope.discoverer_id.is_blank() {
            return Err(Error::invalid_argument("discoverer_id", "must not be empty"));
        }

        info!(
            discoverer_id = %scope.discoverer_id,
            site_id = scope.site_id.as_ref().map(|s| s.as_str()),
            events = events.len(),
            register_only,
            "Starting reconciliation"
        );

        let existing = self
            .applications
            .query_all(&ApplicationFilter::by_discoverer(&scope.discoverer_id))
            .await?;
        let (found, mut endpoints) = Self::collect_observations(scope, events);

        let Partition {
            to_remove,
            to_add,
            to_reconcile,
        } = partition(existing, found);

        debug!(
            to_remove = to_remove.len(),
            to_add = to_add.len(),
            to_reconcile = to_reconcile.len(),
            "Partitioned applications"
        );

        let mut report = ReconcileReport::default();
        let limit = self.config.max_concurrent_mutations;

        if register_only {
            debug!(skipped = to_remove.len(), "Register-only pass, nothing marked lost");
        } else {
            let step: Vec<_> =
                for_each_bounded(to_remove, limit, |app| self.lose(app, scope, context)).await;
            Self::absorb(&mut report, step);
        }

        let to_add: Vec<_> = to_add
            .into_iter()
            .map(|app| {
                let observed = endpoints.remove(&app.logical_key()).unwrap_or_default();
                (app, observed)
            })
            .collect();
        let step: Vec<_> = for_each_bounded(to_add, limit, |(app, observed)| {
            self.add(app, observed, scope, context, register_only)
        })
        .await;
        Self::absorb(&mut report, step);

        let to_reconcile: Vec<_> = to_reconcile
            .into_iter()
            .map(|(current, app)| {
                let observed = endpoints.remove(&app.logical_key()).unwrap_or_default();
                (current, app, observed)
            })
            .collect();
        let step: Vec<_> = for_each_bounded(to_reconcile, limit, |(current, app, observed)| {
            self.refind(current, app, observed, scope, context, register_only)
        })
        .await;
        Self::absorb(&mut report, step);

        info!(
            discoverer_id = %scope.discoverer_id,
            added = report.applications.added,
            updated = report.applications.updated,
            lost = report.applications.lost,
            unchanged = report.applications.unchanged,
            endpoints_added = report.endpoints.added,
            endpoints_updated = report.endpoints.updated,
            endpoints_lost = report.endpoints.lost,
            "Reconciliation complete"
        );

        Ok(report)
    }

    /// Stamp observed templates with the pass scope and group their endpoints
    /// by application identity. The first template per identity wins; later
    /// duplicates contribute only endpoints.
    fn collect_observations(
        scope: &DiscoveryScope,
        events: Vec<DiscoveryEvent>,
    ) -> (Vec<Application>, EndpointsByApplication) {
        let mut found = Vec::with_capacity(events.len());
        let mut endpoints = EndpointsByApplication::new();

        for event in events {
            let mut app = event.application;
            if let Err(e) = app.validate() {
                warn!(index = event.index, error = %e, "Skipping invalid application observation");
                continue;
            }
            app.discoverer_id = Some(scope.discoverer_id.clone());
            if let Some(site_id) = &scope.site_id {
                app.site_id = Some(site_id.clone());
            }
            app.id = app.derive_id();
            app.not_seen_since = None;
            app.generation_id = None;

            if let Some(endpoint) = event.endpoint {
                endpoints.entry(app.logical_key()).or_default().push(endpoint);
            }
            found.push(app);
        }

        (dedup_by_identity(found), endpoints)
    }

    fn absorb(report: &mut ReconcileReport, step: Vec<(Outcome, ReconcileCounters)>) {
        for (outcome, endpoints) in step {
            report.applications.record(outcome);
            report.endpoints.absorb(endpoints);
        }
    }

    async fn lose(
        &self,
        app: Application,
        scope: &DiscoveryScope,
        context: &OperationContext,
    ) -> (Outcome, ReconcileCounters) {
        let result = mutations::mark_lost(
            &self.applications,
            &self.broker,
            &app.id,
            Some(&scope.discoverer_id),
            context,
        )
        .await;

        match settle(result, "application", &app.id) {
            Some(Outcome::Lost) => {
                let endpoints = self.cascade(&app, Vec::new(), scope, context, false).await;
                (Outcome::Lost, endpoints)
            }
            outcome => (outcome.unwrap_or(Outcome::Unchanged), ReconcileCounters::new()),
        }
    }

    async fn add(
        &self,
        app: Application,
        observed: Vec<Endpoint>,
        scope: &DiscoveryScope,
        context: &OperationContext,
        register_only: bool,
    ) -> (Outcome, ReconcileCounters) {
        let result = mutations::upsert(&self.applications, &self.broker, &app, context).await;
        match settle(result, "application", &app.id) {
            Some(outcome) => {
                let endpoints = self
                    .cascade(&app, observed, scope, context, register_only)
                    .await;
                (outcome, endpoints)
            }
            None => (Outcome::Unchanged, ReconcileCounters::new()),
        }
    }

    async fn refind(
        &self,
        current: Application,
        app: Application,
        observed: Vec<Endpoint>,
        scope: &DiscoveryScope,
        context: &OperationContext,
        register_only: bool,
    ) -> (Outcome, ReconcileCounters) {
        let result =
            mutations::refresh(&self.applications, &self.broker, &current.id, &app, context).await;
        match settle(result, "application", &current.id) {
            Some(outcome) => {
                let endpoints = self
                    .cascade(&current, observed, scope, context, register_only)
                    .await;
                (outcome, endpoints)
            }
            None => (Outcome::Unchanged, ReconcileCounters::new()),
        }
    }

    async fn cascade(
        &self,
        app: &Application,
        observed: Vec<Endpoint>,
        scope: &DiscoveryScope,
        context: &OperationContext,
        register_only: bool,
    ) -> ReconcileCounters {
        match self
            .endpoints
            .reconcile(&app.id, observed, scope, context, register_only)
            .await
        {
            Ok(counters) => counters,
            Err(e) => {
                warn!(application_id = %app.id, error = %e, "Endpoint cascade failed");
                ReconcileCounters::new()
            }
        }
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Get the event broker.
    pub const fn broker(&self) -> &Arc<EventBroker> {
        &self.broker
    }
}

/// Builder for `ApplicationReconciler`.
#[derive(Default)]
pub struct ApplicationReconcilerBuilder {
    applications: Option<Repository<Application>>,
    endpoints: Option<Arc<dyn EndpointReconciler>>,
    broker: Option<Arc<EventBroker>>,
    config: ReconcilerConfig,
}

impl ApplicationReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application repository.
    #[must_use]
    pub fn with_applications(mut self, applications: Repository<Application>) -> Self {
        self.applications = Some(applications);
        self
    }

    /// Set the endpoint reconciler.
    #[must_use]
    pub fn with_endpoint_reconciler(mut self, endpoints: Arc<dyn EndpointReconciler>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Set the event broker.
    #[must_use]
    pub fn with_broker(mut self, broker: Arc<EventBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set max concurrent mutations.
    #[must_use]
    pub const fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent_mutations = max;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a collaborator is missing or the
    /// configuration does not validate.
    pub fn build(self) -> Result<ApplicationReconciler> {
        self.config.validate()?;
        let applications = self
            .applications
            .ok_or_else(|| Error::invalid_config("application repository is required"))?;
        let endpoints = self
            .endpoints
            .ok_or_else(|| Error::invalid_config("endpoint reconciler is required"))?;
        let broker = self
            .broker
            .ok_or_else(|| Error::invalid_config("event broker is required"))?;

        Ok(ApplicationReconciler::new(
            applications,
            endpoints,
            broker,
            self.config,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::endpoints::RegistryEndpointReconciler;

    fn reconciler() -> ApplicationReconciler {
        let broker = Arc::new(EventBroker::new());
        let endpoints = Arc::new(RegistryEndpointReconciler::new(
            Repository::in_memory(),
            Arc::clone(&broker),
        ));
        ApplicationReconcilerBuilder::new()
            .with_applications(Repository::in_memory())
            .with_endpoint_reconciler(endpoints)
            .with_broker(broker)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_collaborators() {
        assert!(ApplicationReconcilerBuilder::new().build().is_err());
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = ApplicationReconcilerBuilder::new().max_concurrent(0).build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_collect_observations_stamps_scope_and_dedups() {
        let scope = DiscoveryScope::new("d1").with_site("plant-a");
        let events = vec![
            DiscoveryEvent::new(Application::new("urn:press").with_name("first"))
                .with_endpoint(Endpoint::new("opc.tcp://press:4840")),
            DiscoveryEvent::new(Application::new("urn:press").with_name("second"))
                .with_endpoint(Endpoint::new("opc.tcp://press:4841")),
            DiscoveryEvent::new(Application::new("")),
        ];

        let (found, endpoints) = ApplicationReconciler::collect_observations(&scope, events);

        assert_eq!(found.len(), 1, "duplicate and invalid templates dropped");
        let app = found.first().unwrap();
        assert_eq!(app.application_name.as_deref(), Some("first"));
        assert_eq!(app.site_id.as_ref().map(|s| s.as_str()), Some("plant-a"));
        assert_eq!(app.id, app.derive_id());
        assert_eq!(endpoints.get(&app.logical_key()).map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn should_reject_blank_discoverer() {
        let result = reconciler()
            .reconcile(&DiscoveryScope::new(" "), &OperationContext::now(), false, Vec::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn should_converge_on_empty_pass() -> Result<()> {
        let report = reconciler()
            .reconcile(&DiscoveryScope::new("d1"), &OperationContext::now(), false, Vec::new())
            .await?;
        assert!(report.is_converged());
        assert_eq!(report.applications.total(), 0);
        Ok(())
    }
}
