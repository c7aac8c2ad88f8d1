//! Compare-and-swap repository over a [`DocumentStore`].
//!
//! Each mutation reads the current record, applies a caller closure to that
//! snapshot and writes it back guarded by the snapshot's generation. If the
//! record changed in between, the loop re-reads and runs the closure again,
//! so closures must derive everything they report from the snapshot they are
//! given and reset any captured state on every call.

use std::sync::Arc;

use fleet_core::{Entity, GenerationId};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::memory::InMemoryStore;
use crate::query::{ContinuationToken, EntityFilter, Page};
use crate::store::DocumentStore;

/// Attempts made by [`Repository::add_with_fallback_id`] before giving up.
pub const MAX_ID_ATTEMPTS: u32 = 5;

/// Default page size for [`Repository::query_all`].
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Typed CAS access to one entity collection.
pub struct Repository<E: Entity> {
    store: Arc<dyn DocumentStore<E>>,
    page_size: usize,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            page_size: self.page_size,
        }
    }
}

impl<E: Entity> Repository<E> {
    /// Create a repository over a store.
    pub fn new(store: Arc<dyn DocumentStore<E>>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Create a repository over a fresh [`InMemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::<E>::new()))
    }

    /// Set the page size used when draining queries.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Find a record by id.
    ///
    /// # Errors
    ///
    /// Returns the store's error on backend failure.
    pub async fn find(&self, id: &E::Id) -> Result<Option<E>> {
        self.store.get(id).await
    }

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id is taken.
    pub async fn add(&self, entity: E) -> Result<E> {
        self.store.create(entity).await
    }

    /// Insert a record whose caller-preset id may collide. On `Conflict` the
    /// record is retried under ids drawn from `fresh_id`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` once [`MAX_ID_ATTEMPTS`] ids have collided.
    pub async fn add_with_fallback_id<F>(&self, mut entity: E, mut fresh_id: F) -> Result<E>
    where
        F: FnMut() -> E::Id + Send,
    {
        let mut attempt: u32 = 1;
        loop {
            match self.store.create(entity.clone()).await {
                Err(e) if e.is_conflict() && attempt < MAX_ID_ATTEMPTS => {
                    let id = fresh_id();
                    debug!(kind = E::KIND, taken = %entity.id(), fresh = %id, attempt, "Id taken, retrying with fresh id");
                    entity.set_id(id);
                    attempt = attempt.saturating_add(1);
                }
                result => return result,
            }
        }
    }

    /// Update a record through `mutate`. A `false` return means nothing to
    /// write and yields the current record unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist (or is deleted while
    /// the update retries).
    pub async fn update<F>(&self, id: &E::Id, mut mutate: F) -> Result<E>
    where
        F: FnMut(&mut E) -> bool + Send,
    {
        let mut attempt: u32 = 1;
        loop {
            let mut current = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| RegistryError::not_found(E::KIND, id))?;
            let generation = Self::generation_of(&current)?;

            if !mutate(&mut current) {
                return Ok(current);
            }

            match self.store.replace(current, &generation).await {
                Err(e) if e.is_out_of_date() => {
                    debug!(kind = E::KIND, %id, attempt, "Generation changed, retrying update");
                    attempt = attempt.saturating_add(1);
                }
                result => return result,
            }
        }
    }

    /// Insert or update a record through `mutate`, which receives the current
    /// record (`None` if absent) and returns what to write (`None` for
    /// nothing). Concurrent inserts and deletes are absorbed by retrying on
    /// the other path.
    ///
    /// Returns the stored record, or `None` if the record is absent and
    /// `mutate` declined to create it.
    ///
    /// # Errors
    ///
    /// Returns the store's error for anything but contention.
    pub async fn add_or_update<F>(&self, id: &E::Id, mut mutate: F) -> Result<Option<E>>
    where
        F: FnMut(Option<E>) -> Option<E> + Send,
    {
        let mut attempt: u32 = 1;
        loop {
            let outcome = match self.store.get(id).await? {
                None => {
                    let Some(mut created) = mutate(None) else {
                        return Ok(None);
                    };
                    created.set_id(id.clone());
                    self.store.create(created).await
                }
                Some(current) => {
                    let generation = Self::generation_of(&current)?;
                    let Some(updated) = mutate(Some(current.clone())) else {
                        return Ok(Some(current));
                    };
                    self.store.replace(updated, &generation).await
                }
            };

            match outcome {
                Ok(stored) => return Ok(Some(stored)),
                Err(e) if e.is_conflict() || e.is_out_of_date() || e.is_not_found() => {
                    debug!(kind = E::KIND, %id, attempt, status = %e, "Contention, retrying upsert");
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete a record if `predicate` accepts the current snapshot.
    ///
    /// Returns the deleted record, or `None` if the predicate declined.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    pub async fn delete<P>(&self, id: &E::Id, mut predicate: P) -> Result<Option<E>>
    where
        P: FnMut(&E) -> bool + Send,
    {
        let mut attempt: u32 = 1;
        loop {
            let current = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| RegistryError::not_found(E::KIND, id))?;
            if !predicate(&current) {
                return Ok(None);
            }
            let generation = Self::generation_of(&current)?;

            match self.store.remove(id, &generation).await {
                Ok(()) => return Ok(Some(current)),
                Err(e) if e.is_out_of_date() => {
                    debug!(kind = E::KIND, %id, attempt, "Generation changed, retrying delete");
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One page of matching records.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero page size.
    pub async fn query(
        &self,
        filter: &dyn EntityFilter<E>,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> Result<Page<E>> {
        self.store.query(filter, continuation, page_size).await
    }

    /// Every matching record, draining all pages.
    ///
    /// # Errors
    ///
    /// Returns the first page error.
    pub async fn query_all(&self, filter: &dyn EntityFilter<E>) -> Result<Vec<E>> {
        let mut items = Vec::new();
        let mut continuation = None;
        loop {
            let page = self
                .store
                .query(filter, continuation.as_ref(), self.page_size)
                .await?;
            items.extend(page.items);
            match page.continuation {
                Some(next) => continuation = Some(next),
                None => return Ok(items),
            }
        }
    }

    fn generation_of(entity: &E) -> Result<GenerationId> {
        entity.generation_id().cloned().ok_or_else(|| {
            RegistryError::storage(format!("{} '{}' has no generation", E::KIND, entity.id()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use fleet_core::{Application, ApplicationId};

    use super::*;
    use crate::query::MatchAll;

    fn repository() -> Repository<Application> {
        Repository::in_memory()
    }

    fn app(id: &str) -> Application {
        let mut app = Application::new(format!("urn:{id}"));
        app.id = id.into();
        app
    }

    #[tokio::test]
    async fn should_return_current_when_mutation_declines() -> Result<()> {
        let repo = repository();
        let added = repo.add(app("a")).await?;

        let same = repo.update(&"a".into(), |_| false).await?;
        assert_eq!(same.generation_id, added.generation_id, "no write happened");
        Ok(())
    }

    #[tokio::test]
    async fn should_fail_update_of_missing_record() {
        let repo = repository();
        let err = repo.update(&"missing".into(), |_| true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn should_insert_through_upsert_when_absent() -> Result<()> {
        let repo = repository();
        let stored = repo
            .add_or_update(&"a".into(), |current| match current {
                None => Some(Application::new("urn:a")),
                Some(_) => None,
            })
            .await?
            .unwrap();

        assert_eq!(stored.id, ApplicationId::new("a"), "upsert assigns the requested id");
        assert!(stored.generation_id.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn should_return_none_when_upsert_declines_insert() -> Result<()> {
        let repo = repository();
        assert!(repo.add_or_update(&"a".into(), |_| None).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn should_delete_only_when_predicate_accepts() -> Result<()> {
        let repo = repository();
        repo.add(app("a")).await?;

        assert!(repo.delete(&"a".into(), |_| false).await?.is_none());
        assert!(repo.find(&"a".into()).await?.is_some());

        let deleted = repo.delete(&"a".into(), |_| true).await?;
        assert!(deleted.is_some());
        assert!(repo.find(&"a".into()).await?.is_none());
        assert!(repo.delete(&"a".into(), |_| true).await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn should_regenerate_colliding_preset_id() -> Result<()> {
        let repo = repository();
        repo.add(app("preset")).await?;

        let stored = repo
            .add_with_fallback_id(app("preset"), || ApplicationId::new("fresh"))
            .await?;
        assert_eq!(stored.id.as_str(), "fresh");
        Ok(())
    }

    #[tokio::test]
    async fn should_give_up_after_bounded_id_attempts() -> Result<()> {
        let repo = repository();
        repo.add(app("taken")).await?;

        let mut calls = 0_u32;
        let err = repo
            .add_with_fallback_id(app("taken"), || {
                calls += 1;
                ApplicationId::new("taken")
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(calls, MAX_ID_ATTEMPTS - 1);
        Ok(())
    }

    #[tokio::test]
    async fn should_drain_all_pages() -> Result<()> {
        let repo = repository().with_page_size(2);
        for i in 0..5 {
            repo.add(app(&format!("app-{i}"))).await?;
        }
        assert_eq!(repo.query_all(&MatchAll).await?.len(), 5);
        Ok(())
    }
}
