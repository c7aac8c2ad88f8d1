//! Endpoint records, children of an application.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::OperationContext;
use crate::entity::{Discoverable, Entity, Patchable};
use crate::error::Error;
use crate::identity::{self, LogicalIdentity};
use crate::ids::{ApplicationId, DiscovererId, EndpointId, GenerationId, SiteId};
use crate::patch::{merge, replace};
use crate::result::Result;

/// Message security mode of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SecurityMode {
    #[default]
    None,
    Sign,
    SignAndEncrypt,
}

impl SecurityMode {
    /// Stable name used in identity digests.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sign => "sign",
            Self::SignAndEncrypt => "signandencrypt",
        }
    }
}

/// An endpoint of an application as registered in the fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default)]
    pub id: EndpointId,
    #[serde(default)]
    pub application_id: ApplicationId,
    /// Registration URL.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_urls: Option<BTreeSet<String>>,
    #[serde(default)]
    pub security_mode: SecurityMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<i32>,
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

impl Endpoint {
    /// Create an endpoint template for a registration URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set security mode and policy.
    #[must_use]
    pub fn with_security(mut self, mode: SecurityMode, policy: Option<&str>) -> Self {
        self.security_mode = mode;
        self.security_policy = policy.map(str::to_owned);
        self
    }

    /// Attach the endpoint to its application and stamp ownership, then derive
    /// its id.
    #[must_use]
    pub fn owned_by(
        mut self,
        application_id: &ApplicationId,
        site_id: Option<&SiteId>,
        discoverer_id: &DiscovererId,
    ) -> Self {
        self.application_id = application_id.clone();
        self.site_id = site_id.cloned();
        self.discoverer_id = Some(discoverer_id.clone());
        self.id = self.derive_id();
        self
    }

    /// Derive the deterministic id from the identity fields.
    pub fn derive_id(&self) -> EndpointId {
        identity::endpoint_id(
            &self.application_id,
            &self.url,
            self.security_mode,
            self.security_policy.as_deref(),
        )
    }

    /// Validate the fields required to register the endpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the registration URL is blank.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::invalid_argument("url", "must not be empty"));
        }
        Ok(())
    }
}

impl Entity for Endpoint {
    type Id = EndpointId;

    const KIND: &'static str = "endpoint";

    fn id(&self) -> &EndpointId {
        &self.id
    }

    fn set_id(&mut self, id: EndpointId) {
        self.id = id;
    }

    fn generation_id(&self) -> Option<&GenerationId> {
        self.generation_id.as_ref()
    }

    fn set_generation_id(&mut self, generation_id: GenerationId) {
        self.generation_id = Some(generation_id);
    }
}

impl Discoverable for Endpoint {
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

impl Patchable for Endpoint {
    fn patch(&mut self, update: &Self) -> bool {
        let mut changed = false;
        changed |= merge(&mut self.alternative_urls, update.alternative_urls.as_ref());
        changed |= replace(&mut self.security_level, update.security_level.as_ref());
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

/// Logical identity of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointKey {
    pub application_id: ApplicationId,
    pub url: String,
    pub security_mode: SecurityMode,
    pub security_policy: String,
}

impl LogicalIdentity for Endpoint {
    type Key = EndpointKey;

    fn logical_key(&self) -> EndpointKey {
        EndpointKey {
            application_id: self.application_id.clone(),
            url: identity::normalize_uri(&self.url),
            security_mode: self.security_mode,
            security_policy: identity::normalize_policy(self.security_policy.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_derive_id_when_attached() {
        let app = ApplicationId::new("app-1");
        let endpoint =
            Endpoint::new("opc.tcp://h:4840").owned_by(&app, None, &DiscovererId::new("d1"));

        assert_eq!(endpoint.application_id, app);
        assert_eq!(endpoint.id, endpoint.derive_id());
        assert!(!endpoint.id.is_blank());
    }

    #[test]
    fn should_match_logically_across_url_spelling() {
        let app = ApplicationId::new("app-1");
        let disc = DiscovererId::new("d1");
        let a = Endpoint::new("opc.tcp://H:4840/").owned_by(&app, None, &disc);
        let b = Endpoint::new("opc.tcp://h:4840").owned_by(&app, None, &disc);
        assert_eq!(a.logical_key(), b.logical_key());
    }

    #[test]
    fn should_patch_security_level() {
        let mut endpoint = Endpoint::new("opc.tcp://h:4840");
        let mut update = Endpoint::new("opc.tcp://h:4840");
        update.security_level = Some(3);
        assert!(endpoint.patch(&update));
        assert!(!endpoint.patch(&update));
    }
}
