//! Entry point for discovery results delivered by a transport.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{DiscovererId, OperationContext, SiteId, SupervisorId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::reconciler::ApplicationReconciler;
use crate::types::{DiscoveryConfig, DiscoveryEvent, DiscoveryResult, DiscoveryScope, ReconcileReport};

/// Where a discoverer lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<SupervisorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_config: Option<DiscoveryConfig>,
}

/// Resolves a discoverer to its owning gateway.
#[async_trait]
pub trait GatewayLookup: Send + Sync {
    /// `Ok(None)` when the discoverer is not attached to a known gateway.
    async fn resolve(&self, discoverer_id: &DiscovererId) -> Result<Option<GatewayInfo>>;
}

/// In-memory gateway lookup for testing and embedded use.
#[derive(Default)]
pub struct InMemoryGatewayLookup {
    gateways: RwLock<HashMap<DiscovererId, GatewayInfo>>,
}

impl InMemoryGatewayLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a discoverer to a gateway, replacing any previous entry.
    pub async fn insert(&self, discoverer_id: impl Into<DiscovererId>, gateway: GatewayInfo) {
        self.gateways
            .write()
            .await
            .insert(discoverer_id.into(), gateway);
    }
}

#[async_trait]
impl GatewayLookup for InMemoryGatewayLookup {
    async fn resolve(&self, discoverer_id: &DiscovererId) -> Result<Option<GatewayInfo>> {
        Ok(self.gateways.read().await.get(discoverer_id).cloned())
    }
}

/// What processing a discovery result did.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDiscovery {
    pub result_id: String,
    pub scope: DiscoveryScope,
    /// Discovery settings after gateway defaults were applied. The registry
    /// does not store them; the caller persists them with the discoverer.
    pub discovery_config: DiscoveryConfig,
    /// Transport diagnostics carried by the result, passed through as is.
    pub diagnostics: Option<serde_json::Value>,
    pub report: ReconcileReport,
}

/// Scopes a discovery result to its site and hands it to the reconciler.
pub struct DiscoveryResultProcessor {
    gateways: Arc<dyn GatewayLookup>,
    reconciler: Arc<ApplicationReconciler>,
}

impl DiscoveryResultProcessor {
    pub fn new(gateways: Arc<dyn GatewayLookup>, reconciler: Arc<ApplicationReconciler>) -> Self {
        Self {
            gateways,
            reconciler,
        }
    }

    /// Process one discovery pass of `discoverer_id`.
    ///
    /// Records are stamped with the result's context, else the first event
    /// context, else the current time with the discoverer as authority.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank discoverer id, the lookup's
    /// error if the gateway cannot be resolved, and the reconciler's error if
    /// the registry cannot be read.
    pub async fn process(
        &self,
        discoverer_id: &DiscovererId,
        result: DiscoveryResult,
        events: Vec<DiscoveryEvent>,
    ) -> Result<ProcessedDiscovery> {
        if discoverer_id.is_blank() {
            return Err(Error::invalid_argument("discoverer_id", "must not be empty"));
        }

        let gateway = match self.gateways.resolve(discoverer_id).await? {
            Some(gateway) => gateway,
            None => {
                debug!(%discoverer_id, "No gateway for discoverer, scoping by discoverer");
                GatewayInfo::default()
            }
        };

        let scope = DiscoveryScope {
            site_id: gateway.site_id,
            discoverer_id: discoverer_id.clone(),
            supervisor_id: gateway.supervisor_id,
        };
        let discovery_config = match (result.discovery_config, gateway.default_config) {
            (Some(own), Some(defaults)) => own.merge_defaults(&defaults),
            (own, defaults) => own.or(defaults).unwrap_or_default(),
        };
        let context = result
            .context
            .or_else(|| events.iter().find_map(|e| e.context.clone()))
            .unwrap_or_else(|| OperationContext::now().with_authority(discoverer_id.as_str()));

        info!(
            result_id = %result.id,
            %discoverer_id,
            site_id = scope.site_id.as_ref().map(SiteId::as_str),
            register_only = result.register_only,
            events = events.len(),
            discovery_config = ?discovery_config,
            diagnostics = result.diagnostics.as_ref().map(tracing::field::display),
            "Processing discovery result"
        );

        let report = self
            .reconciler
            .reconcile(&scope, &context, result.register_only, events)
            .await?;

        Ok(ProcessedDiscovery {
            result_id: result.id,
            scope,
            discovery_config,
            diagnostics: result.diagnostics,
            report,
        })
    }
}
