//! Identity derivation and logical identity.
//!
//! Storage ids are SHA-256 digests of the normalized identity fields, so the
//! same real application re-observed by any pass maps to the same id.

use std::fmt;
use std::hash::Hash;

use itertools::Itertools;
use sha2::{Digest, Sha256};
use url::Url;

use crate::application::ApplicationType;
use crate::endpoint::SecurityMode;
use crate::ids::{ApplicationId, EndpointId};

/// Equality over stable, normalized fields, ignoring volatile ones.
pub trait LogicalIdentity {
    /// Comparable key built from the identity fields.
    type Key: Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync;

    /// Compute the logical key.
    fn logical_key(&self) -> Self::Key;
}

/// Normalize a URI or URL for identity comparison.
///
/// Parseable URLs are canonicalized first; everything is trimmed, stripped of
/// a trailing slash and lowercased.
pub fn normalize_uri(value: &str) -> String {
    let trimmed = value.trim();
    let canonical = Url::parse(trimmed).map_or_else(|_| trimmed.to_owned(), String::from);
    canonical.trim_end_matches('/').to_lowercase()
}

/// Derive the id of an application from its scope (site, or discoverer when
/// no site is known), type and URI.
pub fn application_id(scope: &str, application_uri: &str, kind: ApplicationType) -> ApplicationId {
    ApplicationId::new(digest(&[
        scope.trim().to_lowercase().as_str(),
        kind.as_str(),
        normalize_uri(application_uri).as_str(),
    ]))
}

/// Derive the id of an endpoint from its owning application and security
/// configuration.
pub fn endpoint_id(
    application_id: &ApplicationId,
    url: &str,
    security_mode: SecurityMode,
    security_policy: Option<&str>,
) -> EndpointId {
    EndpointId::new(digest(&[
        normalize_uri(url).as_str(),
        application_id.as_str(),
        security_mode.as_str(),
        normalize_policy(security_policy).as_str(),
    ]))
}

/// Normalize a security policy; an absent policy is the "none" policy.
pub fn normalize_policy(policy: Option<&str>) -> String {
    policy
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map_or_else(|| "none".to_owned(), normalize_uri)
}

fn digest(parts: &[&str]) -> String {
    format!("{:x}", Sha256::digest(parts.iter().join("-").as_bytes()))
}
