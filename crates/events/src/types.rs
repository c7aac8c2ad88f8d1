//! Core types for the events crate.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Ulid);

impl EventId {
    /// Create a new random event ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get the inner ULID.
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener_{}", self.0)
    }
}

/// Lifecycle notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Record inserted.
    New,
    /// Content fields changed.
    Updated,
    /// Lost record observed again.
    Found,
    /// Record no longer observed.
    Lost,
    /// Record hard-deleted.
    Deleted,
}

impl EventKind {
    /// Every kind, in tag order.
    pub const ALL: [Self; 5] = [
        Self::New,
        Self::Updated,
        Self::Found,
        Self::Lost,
        Self::Deleted,
    ];
}

/// Kind of record an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    Application,
    Endpoint,
}

impl SubjectKind {
    /// Every subject kind.
    pub const ALL: [Self; 2] = [Self::Application, Self::Endpoint];
}

/// Type tag of an event, e.g. `application.lost`.
pub const fn event_tag(subject: SubjectKind, kind: EventKind) -> &'static str {
    match (subject, kind) {
        (SubjectKind::Application, EventKind::New) => "application.new",
        (SubjectKind::Application, EventKind::Updated) => "application.updated",
        (SubjectKind::Application, EventKind::Found) => "application.found",
        (SubjectKind::Application, EventKind::Lost) => "application.lost",
        (SubjectKind::Application, EventKind::Deleted) => "application.deleted",
        (SubjectKind::Endpoint, EventKind::New) => "endpoint.new",
        (SubjectKind::Endpoint, EventKind::Updated) => "endpoint.updated",
        (SubjectKind::Endpoint, EventKind::Found) => "endpoint.found",
        (SubjectKind::Endpoint, EventKind::Lost) => "endpoint.lost",
        (SubjectKind::Endpoint, EventKind::Deleted) => "endpoint.deleted",
    }
}

/// Every known event tag.
pub fn all_tags() -> impl Iterator<Item = (SubjectKind, EventKind, &'static str)> {
    SubjectKind::ALL.into_iter().flat_map(|subject| {
        EventKind::ALL
            .into_iter()
            .map(move |kind| (subject, kind, event_tag(subject, kind)))
    })
}
