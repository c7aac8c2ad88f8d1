//! Document store contract.
//!
//! The primitive a backend must provide. Writes are guarded by the record's
//! generation token and report contention as explicit status values; retry
//! policy lives in [`crate::Repository`], not here.

use async_trait::async_trait;
use fleet_core::{Entity, GenerationId};

use crate::error::Result;
use crate::query::{ContinuationToken, EntityFilter, Page};

/// Versioned storage for one entity type.
#[async_trait]
pub trait DocumentStore<E: Entity>: Send + Sync {
    /// Read one record.
    async fn get(&self, id: &E::Id) -> Result<Option<E>>;

    /// Insert a new record and assign its first generation.
    ///
    /// Fails with `Conflict` if the id exists.
    async fn create(&self, entity: E) -> Result<E>;

    /// Replace a record if its generation still equals `expected`.
    ///
    /// Fails with `NotFound` if the record is gone and `OutOfDate` if it
    /// changed since it was read.
    async fn replace(&self, entity: E, expected: &GenerationId) -> Result<E>;

    /// Remove a record if its generation still equals `expected`.
    async fn remove(&self, id: &E::Id, expected: &GenerationId) -> Result<()>;

    /// One page of records matching `filter`, in id order.
    async fn query(
        &self,
        filter: &dyn EntityFilter<E>,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> Result<Page<E>>;
}
