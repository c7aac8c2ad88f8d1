//! Lost/found state machine for discoverable records.
//!
//! A record is *found* while `not_seen_since` is `None` and *lost* once a pass
//! fails to re-observe it. Every function here is pure; callers run them inside
//! a repository mutation so the prior state they read is the state the write
//! replaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::OperationContext;
use crate::entity::{Discoverable, Patchable};

/// Presence of a record on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    /// Seen by the most recent relevant pass.
    Found,
    /// Not seen since the recorded time.
    Lost,
}

/// Lifecycle flip caused by a single mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Presence did not change.
    #[default]
    Unchanged,
    /// Found → Lost.
    Lost,
    /// Lost → Found.
    Found,
}

/// Everything a single mutation did to a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Change {
    /// A content field changed.
    pub content_changed: bool,
    /// Presence flipped.
    pub transition: Transition,
}

impl Change {
    /// True when the mutation must be written.
    pub const fn is_write(&self) -> bool {
        self.content_changed || !matches!(self.transition, Transition::Unchanged)
    }
}

/// Current presence of a record.
pub fn presence<E: Discoverable>(entity: &E) -> Presence {
    if entity.is_lost() {
        Presence::Lost
    } else {
        Presence::Found
    }
}

/// Mark a record lost at `at`. A record that is already lost keeps its
/// original timestamp so retention is measured from the first loss.
pub fn mark_lost<E: Discoverable>(entity: &mut E, at: DateTime<Utc>) -> Transition {
    match presence(entity) {
        Presence::Lost => Transition::Unchanged,
        Presence::Found => {
            entity.set_not_seen_since(Some(at));
            Transition::Lost
        }
    }
}

/// Mark a record found.
pub fn mark_found<E: Discoverable>(entity: &mut E) -> Transition {
    match presence(entity) {
        Presence::Found => Transition::Unchanged,
        Presence::Lost => {
            entity.set_not_seen_since(None);
            Transition::Found
        }
    }
}

/// Apply a fresh observation to an existing record: re-find it and merge the
/// observed fields. `Updated` is stamped only when something changed.
pub fn observe<E>(existing: &mut E, observed: &E, context: &OperationContext) -> Change
where
    E: Discoverable + Patchable,
{
    let transition = mark_found(existing);
    let content_changed = existing.patch(observed);
    let change = Change {
        content_changed,
        transition,
    };
    if change.is_write() {
        existing.stamp_updated(context);
    }
    change
}

/// Record that a pass did not observe an existing record.
pub fn lose<E>(existing: &mut E, context: &OperationContext) -> Change
where
    E: Discoverable + Patchable,
{
    let change = Change {
        content_changed: false,
        transition: mark_lost(existing, context.time),
    };
    if change.is_write() {
        existing.stamp_updated(context);
    }
    change
}

/// Build a new record from an observed template.
pub fn admit<E>(template: &E, context: &OperationContext) -> E
where
    E: Clone + Discoverable + Patchable,
{
    let mut entity = template.clone();
    entity.set_not_seen_since(None);
    entity.stamp_created(context);
    entity.stamp_updated(context);
    entity
}

/// True when the record has been lost since before `cutoff`.
pub fn is_stale<E: Discoverable>(entity: &E, cutoff: DateTime<Utc>) -> bool {
    entity.not_seen_since().is_some_and(|since| since < cutoff)
}
