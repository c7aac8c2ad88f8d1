//! Query filters and paging.

use chrono::{DateTime, Utc};
use fleet_core::{
    Application, ApplicationId, ApplicationType, Discoverable, DiscovererId, Endpoint, SiteId,
};
use serde::{Deserialize, Serialize};

/// Opaque position in a paged query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<E> {
    pub items: Vec<E>,
    /// Present while more results remain.
    pub continuation: Option<ContinuationToken>,
}

/// Predicate evaluated by a store when executing a query.
pub trait EntityFilter<E>: Send + Sync {
    fn matches(&self, entity: &E) -> bool;
}

/// Filter matching every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl<E> EntityFilter<E> for MatchAll {
    fn matches(&self, _entity: &E) -> bool {
        true
    }
}

/// Lost/found constraint shared by the record filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresenceFilter {
    /// Found and lost records.
    #[default]
    Any,
    /// Only records currently observed.
    FoundOnly,
    /// Only records lost since before the cutoff.
    LostBefore(DateTime<Utc>),
}

impl PresenceFilter {
    fn matches<E: Discoverable>(self, entity: &E) -> bool {
        match self {
            Self::Any => true,
            Self::FoundOnly => !entity.is_lost(),
            Self::LostBefore(cutoff) => fleet_core::lifecycle::is_stale(entity, cutoff),
        }
    }
}

/// Application query filter. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationFilter {
    pub discoverer_id: Option<DiscovererId>,
    pub site_id: Option<SiteId>,
    pub application_type: Option<ApplicationType>,
    pub presence: PresenceFilter,
}

impl ApplicationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applications attributed to a discoverer, lost ones included.
    pub fn by_discoverer(discoverer_id: &DiscovererId) -> Self {
        Self {
            discoverer_id: Some(discoverer_id.clone()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_site(mut self, site_id: &SiteId) -> Self {
        self.site_id = Some(site_id.clone());
        self
    }

    #[must_use]
    pub const fn with_type(mut self, application_type: ApplicationType) -> Self {
        self.application_type = Some(application_type);
        self
    }

    #[must_use]
    pub const fn found_only(mut self) -> Self {
        self.presence = PresenceFilter::FoundOnly;
        self
    }

    #[must_use]
    pub const fn lost_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.presence = PresenceFilter::LostBefore(cutoff);
        self
    }
}

impl EntityFilter<Application> for ApplicationFilter {
    fn matches(&self, app: &Application) -> bool {
        self.discoverer_id
            .as_ref()
            .is_none_or(|d| app.discoverer_id.as_ref() == Some(d))
            && self
                .site_id
                .as_ref()
                .is_none_or(|s| app.site_id.as_ref() == Some(s))
            && self
                .application_type
                .is_none_or(|t| app.application_type == t)
            && self.presence.matches(app)
    }
}

/// Endpoint query filter, found and lost endpoints alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointFilter {
    pub application_id: Option<ApplicationId>,
}

impl EndpointFilter {
    /// Endpoints of one application, whoever discovered them.
    pub fn by_application(application_id: &ApplicationId) -> Self {
        Self {
            application_id: Some(application_id.clone()),
        }
    }
}

impl EntityFilter<Endpoint> for EndpointFilter {
    fn matches(&self, endpoint: &Endpoint) -> bool {
        self.application_id
            .as_ref()
            .is_none_or(|a| &endpoint.application_id == a)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn should_match_discoverer_including_lost() {
        let mut app = Application::new("urn:a").with_discoverer("d1");
        app.not_seen_since = Some(Utc::now());

        assert!(ApplicationFilter::by_discoverer(&"d1".into()).matches(&app));
        assert!(!ApplicationFilter::by_discoverer(&"d2".into()).matches(&app));
        assert!(!ApplicationFilter::new().found_only().matches(&app));
    }

    #[test]
    fn should_match_lost_before_cutoff_only() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
        let mut app = Application::new("urn:a");
        let filter = ApplicationFilter::new().lost_before(t0);
        assert!(!filter.matches(&app), "found records are never stale");

        app.not_seen_since = Some(t0 - chrono::Duration::seconds(1));
        assert!(filter.matches(&app));
        app.not_seen_since = Some(t0);
        assert!(!filter.matches(&app), "cutoff is exclusive");
    }

    #[test]
    fn should_match_endpoints_by_application() {
        let endpoint = Endpoint::new("opc.tcp://h:4840").owned_by(&"app-1".into(), None, &"d1".into());

        assert!(EndpointFilter::by_application(&"app-1".into()).matches(&endpoint));
        assert!(!EndpointFilter::by_application(&"app-2".into()).matches(&endpoint));

        let claimed = endpoint.owned_by(&"app-1".into(), None, &"d2".into());
        assert!(
            EndpointFilter::by_application(&"app-1".into()).matches(&claimed),
            "any discoverer"
        );
    }
}
