//! Endpoint cascade.

use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{ApplicationId, Endpoint, OperationContext};
use fleet_events::EventBroker;
use fleet_registry::{EndpointFilter, Repository};
use tracing::{debug, warn};

use crate::diff::{partition, Partition};
use crate::error::Result;
use crate::mutations::{self, for_each_bounded, settle};
use crate::types::{DiscoveryScope, Outcome, ReconcileCounters};

/// Reconciles the endpoints one discoverer observed for one application.
#[async_trait]
pub trait EndpointReconciler: Send + Sync {
    /// Reconcile every registered endpoint of `application_id` against what
    /// `scope`'s discoverer observed. An empty `observed` marks all of them
    /// lost unless `register_only` is set.
    async fn reconcile(
        &self,
        application_id: &ApplicationId,
        observed: Vec<Endpoint>,
        scope: &DiscoveryScope,
        context: &OperationContext,
        register_only: bool,
    ) -> Result<ReconcileCounters>;
}

/// Endpoint reconciler writing through the endpoint repository.
pub struct RegistryEndpointReconciler {
    endpoints: Repository<Endpoint>,
    broker: Arc<EventBroker>,
    max_concurrent: usize,
}

impl RegistryEndpointReconciler {
    pub fn new(endpoints: Repository<Endpoint>, broker: Arc<EventBroker>) -> Self {
        Self {
            endpoints,
            broker,
            max_concurrent: 8,
        }
    }

    /// Limit concurrent endpoint mutations.
    #[must_use]
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    fn stamp_observed(
        application_id: &ApplicationId,
        observed: Vec<Endpoint>,
        scope: &DiscoveryScope,
    ) -> Vec<Endpoint> {
        observed
            .into_iter()
            .filter_map(|template| match template.validate() {
                Ok(()) => {
                    let mut stamped = template.owned_by(
                        application_id,
                        scope.site_id.as_ref(),
                        &scope.discoverer_id,
                    );
                    stamped.not_seen_since = None;
                    stamped.generation_id = None;
                    Some(stamped)
                }
                Err(e) => {
                    warn!(%application_id, error = %e, "Skipping invalid endpoint observation");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl EndpointReconciler for RegistryEndpointReconciler {
    async fn reconcile(
        &self,
        application_id: &ApplicationId,
        observed: Vec<Endpoint>,
        scope: &DiscoveryScope,
        context: &OperationContext,
        register_only: bool,
    ) -> Result<ReconcileCounters> {
        // Every endpoint of the application: after an ownership transfer the
        // new owner's pass also settles endpoints the previous owner registered.
        let filter = EndpointFilter::by_application(application_id);
        let existing = self.endpoints.query_all(&filter).await?;
        let found = Self::stamp_observed(application_id, observed, scope);

        let Partition {
            to_remove,
            to_add,
            to_reconcile,
        } = partition(existing, found);

        let repo = &self.endpoints;
        let broker = self.broker.as_ref();
        let mut counters = ReconcileCounters::new();

        if !register_only {
            counters.absorb(
                for_each_bounded(to_remove, self.max_concurrent, |endpoint| async move {
                    let owner = endpoint.discoverer_id.as_ref();
                    let result = mutations::mark_lost(repo, broker, &endpoint.id, owner, context).await;
                    settle(result, "endpoint", &endpoint.id).unwrap_or(Outcome::Unchanged)
                })
                .await,
            );
        }

        counters.absorb(
            for_each_bounded(to_add, self.max_concurrent, |template| async move {
                let result = mutations::upsert(repo, broker, &template, context).await;
                settle(result, "endpoint", &template.id).unwrap_or(Outcome::Unchanged)
            })
            .await,
        );

        counters.absorb(
            for_each_bounded(to_reconcile, self.max_concurrent, |(current, observed)| async move {
                let result = mutations::refresh(repo, broker, &current.id, &observed, context).await;
                settle(result, "endpoint", &current.id).unwrap_or(Outcome::Unchanged)
            })
            .await,
        );

        debug!(
            %application_id,
            discoverer_id = %scope.discoverer_id,
            added = counters.added,
            updated = counters.updated,
            lost = counters.lost,
            unchanged = counters.unchanged,
            "Reconciled endpoints"
        );
        Ok(counters)
    }
}
