//! Core types for the reconciler.

use fleet_core::{Application, Change, DiscovererId, Endpoint, OperationContext, SiteId, SupervisorId, Transition};
use serde::{Deserialize, Serialize};

/// Who a pass is reconciling for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryScope {
    /// Owning site, when the discoverer's gateway is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    pub discoverer_id: DiscovererId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<SupervisorId>,
}

impl DiscoveryScope {
    /// Scope of a discoverer with no known site.
    pub fn new(discoverer_id: impl Into<DiscovererId>) -> Self {
        Self {
            discoverer_id: discoverer_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_site(mut self, site_id: impl Into<SiteId>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    #[must_use]
    pub fn with_supervisor(mut self, supervisor_id: impl Into<SupervisorId>) -> Self {
        self.supervisor_id = Some(supervisor_id.into());
        self
    }
}

/// Discovery settings of a discoverer. Absent fields inherit the gateway
/// default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_ranges_to_scan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_ranges_to_scan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_network_probes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_port_probes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_time_between_scans_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locales: Option<Vec<String>>,
}

impl DiscoveryConfig {
    /// Fill every absent field from `defaults`. Present fields win.
    #[must_use]
    pub fn merge_defaults(mut self, defaults: &Self) -> Self {
        fn fill<T: Clone>(field: &mut Option<T>, default: Option<&T>) {
            if field.is_none() {
                *field = default.cloned();
            }
        }
        fill(&mut self.address_ranges_to_scan, defaults.address_ranges_to_scan.as_ref());
        fill(&mut self.port_ranges_to_scan, defaults.port_ranges_to_scan.as_ref());
        fill(&mut self.max_network_probes, defaults.max_network_probes.as_ref());
        fill(&mut self.max_port_probes, defaults.max_port_probes.as_ref());
        fill(
            &mut self.idle_time_between_scans_secs,
            defaults.idle_time_between_scans_secs.as_ref(),
        );
        fill(&mut self.discovery_urls, defaults.discovery_urls.as_ref());
        fill(&mut self.locales, defaults.locales.as_ref());
        self
    }
}

/// Envelope of one discovery pass as delivered by a transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// Transport-assigned id of the pass.
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_config: Option<DiscoveryConfig>,
    /// Only add or update; never mark anything lost.
    #[serde(default)]
    pub register_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<OperationContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

/// One observation: an application and optionally one of its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEvent {
    pub application: Application,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    /// Position within the pass.
    #[serde(default)]
    pub index: usize,
    /// When and by whom this observation was made. Records are stamped with
    /// the pass context; this one only stands in for it when the result
    /// carries none (see `DiscoveryResultProcessor::process`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<OperationContext>,
}

impl DiscoveryEvent {
    pub fn new(application: Application) -> Self {
        Self {
            application,
            endpoint: None,
            index: 0,
            context: None,
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub const fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// What a single entity mutation amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Added,
    Updated,
    Lost,
    Unchanged,
}

impl Outcome {
    /// Classify a mutation of an existing record.
    pub const fn of_change(change: Change) -> Self {
        match change.transition {
            Transition::Lost => Self::Lost,
            Transition::Found => Self::Updated,
            Transition::Unchanged if change.content_changed => Self::Updated,
            Transition::Unchanged => Self::Unchanged,
        }
    }
}

/// Per-entity-kind tallies of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileCounters {
    pub added: usize,
    pub updated: usize,
    pub lost: usize,
    pub unchanged: usize,
}

impl ReconcileCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one outcome.
    pub fn record(&mut self, outcome: Outcome) {
        let slot = match outcome {
            Outcome::Added => &mut self.added,
            Outcome::Updated => &mut self.updated,
            Outcome::Lost => &mut self.lost,
            Outcome::Unchanged => &mut self.unchanged,
        };
        *slot = slot.saturating_add(1);
    }

    /// Add another set of counters.
    pub fn absorb(&mut self, other: Self) {
        self.added = self.added.saturating_add(other.added);
        self.updated = self.updated.saturating_add(other.updated);
        self.lost = self.lost.saturating_add(other.lost);
        self.unchanged = self.unchanged.saturating_add(other.unchanged);
    }

    /// Number of entities processed.
    pub const fn total(&self) -> usize {
        self.added
            .saturating_add(self.updated)
            .saturating_add(self.lost)
            .saturating_add(self.unchanged)
    }

    /// True when the pass changed nothing.
    pub const fn is_converged(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.lost == 0
    }
}

impl Extend<Outcome> for ReconcileCounters {
    fn extend<I: IntoIterator<Item = Outcome>>(&mut self, iter: I) {
        iter.into_iter().for_each(|outcome| self.record(outcome));
    }
}

impl FromIterator<Outcome> for ReconcileCounters {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        let mut counters = Self::new();
        counters.extend(iter);
        counters
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub applications: ReconcileCounters,
    pub endpoints: ReconcileCounters,
}

impl ReconcileReport {
    /// True when neither applications nor endpoints changed.
    pub const fn is_converged(&self) -> bool {
        self.applications.is_converged() && self.endpoints.is_converged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_of_change() {
        let lost = Change {
            content_changed: false,
            transition: Transition::Lost,
        };
        let refound = Change {
            content_changed: false,
            transition: Transition::Found,
        };
        assert_eq!(Outcome::of_change(lost), Outcome::Lost);
        assert_eq!(Outcome::of_change(refound), Outcome::Updated);
        assert_eq!(Outcome::of_change(Change::default()), Outcome::Unchanged);
    }

    #[test]
    fn test_counters_collect() {
        let counters: ReconcileCounters =
            [Outcome::Added, Outcome::Unchanged, Outcome::Unchanged].into_iter().collect();
        assert_eq!(counters.added, 1);
        assert_eq!(counters.unchanged, 2);
        assert_eq!(counters.total(), 3);
        assert!(!counters.is_converged());
    }

    #[test]
    fn test_merge_defaults_keeps_present_fields() {
        let own = DiscoveryConfig {
            port_ranges_to_scan: Some("4840".to_string()),
            ..DiscoveryConfig::default()
        };
        let defaults = DiscoveryConfig {
            port_ranges_to_scan: Some("1-65535".to_string()),
            max_port_probes: Some(10),
            ..DiscoveryConfig::default()
        };

        let merged = own.merge_defaults(&defaults);
        assert_eq!(merged.port_ranges_to_scan.as_deref(), Some("4840"));
        assert_eq!(merged.max_port_probes, Some(10));
    }

    #[test]
    fn test_discovery_result_from_json() -> Result<(), serde_json::Error> {
        let result: DiscoveryResult = serde_json::from_str(
            r#"{"id":"pass-1","registerOnly":true,"diagnostics":{"scanned":12}}"#,
        )?;
        assert!(result.register_only);
        assert!(result.discovery_config.is_none());
        Ok(())
    }
}
