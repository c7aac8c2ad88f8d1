//! Application records.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::OperationContext;
use crate::entity::{Discoverable, Entity, Patchable};
use crate::error::Error;
use crate::identity::{self, LogicalIdentity};
use crate::ids::{ApplicationId, DiscovererId, GenerationId, SiteId};
use crate::patch::{merge, replace};
use crate::result::Result;

/// Kind of application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApplicationType {
    #[default]
    Server,
    Client,
    ClientAndServer,
    DiscoveryServer,
}

impl ApplicationType {
    /// Stable name used in identity digests.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
            Self::ClientAndServer => "clientandserver",
            Self::DiscoveryServer => "discoveryserver",
        }
    }
}

/// A discovered (or explicitly registered) server application.
///
/// Optional fields follow patch semantics: `None` means "not reported",
/// an empty value means "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub id: ApplicationId,
    pub application_uri: String,
    #[serde(default)]
    pub application_type: ApplicationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_names: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_urls: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_profile_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_server_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_addresses: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverer_id: Option<DiscovererId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_seen_since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<GenerationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<OperationContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<OperationContext>,
}

impl Application {
    /// Create a server application template for a URI.
    pub fn new(application_uri: impl Into<String>) -> Self {
        Self {
            application_uri: application_uri.into(),
            ..Self::default()
        }
    }

    /// Set the application type.
    #[must_use]
    pub const fn with_type(mut self, application_type: ApplicationType) -> Self {
        self.application_type = application_type;
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Add a discovery URL.
    #[must_use]
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_urls
            .get_or_insert_with(BTreeSet::new)
            .insert(url.into());
        self
    }

    /// Add a capability.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities
            .get_or_insert_with(BTreeSet::new)
            .insert(capability.into());
        self
    }

    /// Set the owning site.
    #[must_use]
    pub fn with_site(mut self, site_id: impl Into<SiteId>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    /// Set the owning discoverer.
    #[must_use]
    pub fn with_discoverer(mut self, discoverer_id: impl Into<DiscovererId>) -> Self {
        self.discoverer_id = Some(discoverer_id.into());
        self
    }

    /// Scope used for identity: the site, else the discoverer, else empty.
    pub fn identity_scope(&self) -> &str {
        self.site_id
            .as_ref()
            .map(SiteId::as_str)
            .or_else(|| self.discoverer_id.as_ref().map(DiscovererId::as_str))
            .unwrap_or_default()
    }

    /// Derive the deterministic id from the identity fields.
    pub fn derive_id(&self) -> ApplicationId {
        identity::application_id(
            self.identity_scope(),
            &self.application_uri,
            self.application_type,
        )
    }

    /// Validate the fields required to register the application.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the application URI is blank.
    pub fn validate(&self) -> Result<()> {
        if self.application_uri.trim().is_empty() {
            return Err(Error::invalid_argument(
                "application_uri",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

impl Entity for Application {
    type Id = ApplicationId;

    const KIND: &'static str = "application";

    fn id(&self) -> &ApplicationId {
        &self.id
    }

    fn set_id(&mut self, id: ApplicationId) {
        self.id = id;
    }

    fn generation_id(&self) -> Option<&GenerationId> {
        self.generation_id.as_ref()
    }

    fn set_generation_id(&mut self, generation_id: GenerationId) {
        self.generation_id = Some(generation_id);
    }
}

impl Discoverable for Application {
    fn not_seen_since(&self) -> Option<DateTime<Utc>> {
        self.not_seen_since
    }

    fn set_not_seen_since(&mut self, value: Option<DateTime<Utc>>) {
        self.not_seen_since = value;
    }

    fn discoverer_id(&self) -> Option<&DiscovererId> {
        self.discoverer_id.as_ref()
    }
}

impl Patchable for Application {
    fn patch(&mut self, update: &Self) -> bool {
        let mut changed = false;
        changed |= merge(&mut self.application_name, update.application_name.as_ref());
        changed |= merge(&mut self.locale, update.locale.as_ref());
        changed |= merge(&mut self.localized_names, update.localized_names.as_ref());
        changed |= merge(&mut self.product_uri, update.product_uri.as_ref());
        changed |= merge(&mut self.capabilities, update.capabilities.as_ref());
        changed |= merge(&mut self.discovery_urls, update.discovery_urls.as_ref());
        changed |= merge(
            &mut self.discovery_profile_uri,
            update.discovery_profile_uri.as_ref(),
        );
        changed |= merge(&mut self.gateway_server_uri, update.gateway_server_uri.as_ref());
        changed |= merge(&mut self.host_addresses, update.host_addresses.as_ref());
        changed |= replace(&mut self.site_id, update.site_id.as_ref());
        changed |= replace(&mut self.discoverer_id, update.discoverer_id.as_ref());
        changed
    }

    fn stamp_created(&mut self, context: &OperationContext) {
        self.created = Some(context.clone());
    }

    fn stamp_updated(&mut self, context: &OperationContext) {
        self.updated = Some(context.clone());
    }
}

/// Logical identity of an application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicationKey {
    pub scope: String,
    pub application_type: ApplicationType,
    pub application_uri: String,
}

impl LogicalIdentity for Application {
    type Key = ApplicationKey;

    fn logical_key(&self) -> ApplicationKey {
        ApplicationKey {
            scope: self.identity_scope().trim().to_lowercase(),
            application_type: self.application_type,
            application_uri: identity::normalize_uri(&self.application_uri),
        }
    }
}
