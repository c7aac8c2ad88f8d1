//! Traits shared by every registry record.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use crate::context::OperationContext;
use crate::ids::{DiscovererId, GenerationId};

/// A versioned record stored in the registry.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Storage key type. Keys are expected to order the same way as their
    /// `Display` form so string continuation tokens page correctly.
    type Id: Clone + Eq + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Entity kind used in logs, errors and event tags.
    const KIND: &'static str;

    /// Storage key.
    fn id(&self) -> &Self::Id;

    /// Replace the storage key.
    fn set_id(&mut self, id: Self::Id);

    /// Current concurrency token, if the record has been persisted.
    fn generation_id(&self) -> Option<&GenerationId>;

    /// Set the concurrency token. Only storage backends call this.
    fn set_generation_id(&mut self, generation_id: GenerationId);
}

/// A record whose presence on the network is tracked over time.
pub trait Discoverable {
    /// When the record was first found missing, `None` while observed.
    fn not_seen_since(&self) -> Option<DateTime<Utc>>;

    /// Set or clear the not-seen timestamp.
    fn set_not_seen_since(&mut self, value: Option<DateTime<Utc>>);

    /// Discoverer that currently owns the record.
    fn discoverer_id(&self) -> Option<&DiscovererId>;

    /// True while the record is marked lost.
    fn is_lost(&self) -> bool {
        self.not_seen_since().is_some()
    }
}

/// A record that can absorb a partial observation of itself.
pub trait Patchable {
    /// Merge `update` into `self`. Returns whether any content field changed.
    fn patch(&mut self, update: &Self) -> bool;

    /// Stamp the creation context.
    fn stamp_created(&mut self, context: &OperationContext);

    /// Stamp the last-update context.
    fn stamp_updated(&mut self, context: &OperationContext);
}
