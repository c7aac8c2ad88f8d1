//! Registry lifecycle events.

use chrono::{DateTime, Utc};
use fleet_core::{Application, Endpoint, OperationContext};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{event_tag, EventId, EventKind, SubjectKind};

/// The record an event is about, as it looked after the mutation (or before
/// deletion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record")]
pub enum Subject {
    Application(Box<Application>),
    Endpoint(Box<Endpoint>),
}

impl Subject {
    /// Kind of the subject.
    pub const fn kind(&self) -> SubjectKind {
        match self {
            Self::Application(_) => SubjectKind::Application,
            Self::Endpoint(_) => SubjectKind::Endpoint,
        }
    }

    /// Storage id of the subject.
    pub fn id(&self) -> &str {
        match self {
            Self::Application(app) => app.id.as_str(),
            Self::Endpoint(endpoint) => endpoint.id.as_str(),
        }
    }
}

impl From<Application> for Subject {
    fn from(application: Application) -> Self {
        Self::Application(Box::new(application))
    }
}

impl From<Endpoint> for Subject {
    fn from(endpoint: Endpoint) -> Self {
        Self::Endpoint(Box::new(endpoint))
    }
}

/// A lifecycle notification delivered through the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEvent {
    pub event_id: EventId,
    pub kind: EventKind,
    pub subject: Subject,
    /// Context of the mutation that caused the event.
    pub context: OperationContext,
    pub timestamp: DateTime<Utc>,
}

impl RegistryEvent {
    /// Create an event for a mutation.
    pub fn new(kind: EventKind, subject: impl Into<Subject>, context: OperationContext) -> Self {
        Self {
            event_id: EventId::new(),
            kind,
            subject: subject.into(),
            context,
            timestamp: Utc::now(),
        }
    }

    /// Type tag used for routing, e.g. `application.found`.
    pub const fn event_type(&self) -> &'static str {
        event_tag(self.subject.kind(), self.kind)
    }

    /// Storage id of the subject.
    pub fn subject_id(&self) -> &str {
        self.subject.id()
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the payload cannot be encoded.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::serialization(e.to_string()))
    }
}
