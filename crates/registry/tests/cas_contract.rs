//! Concurrency contract of the CAS repository.
//!
//! The interleaving store parks the first N reads on a barrier so that
//! concurrent mutations are guaranteed to start from the same generation.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{Entity, GenerationId};
use fleet_registry::{
    ContinuationToken, DocumentStore, EntityFilter, InMemoryStore, Page, Repository, Result,
};
use tokio::sync::Barrier;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Counter {
    id: String,
    value: u64,
    generation_id: Option<GenerationId>,
}

impl Entity for Counter {
    type Id = String;

    const KIND: &'static str = "counter";

    fn id(&self) -> &String {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn generation_id(&self) -> Option<&GenerationId> {
        self.generation_id.as_ref()
    }

    fn set_generation_id(&mut self, generation_id: GenerationId) {
        self.generation_id = Some(generation_id);
    }
}

/// Store that holds the first `gated` reads until `gated` readers arrived.
struct InterleavingStore {
    inner: InMemoryStore<Counter>,
    barrier: Barrier,
    gated: AtomicUsize,
    reads: AtomicUsize,
}

impl InterleavingStore {
    fn new(gated: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            barrier: Barrier::new(gated),
            gated: AtomicUsize::new(gated),
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore<Counter> for InterleavingStore {
    async fn get(&self, id: &String) -> Result<Option<Counter>> {
        let current = self.inner.get(id).await?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let hold = self
            .gated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hold {
            self.barrier.wait().await;
        }
        Ok(current)
    }

    async fn create(&self, entity: Counter) -> Result<Counter> {
        self.inner.create(entity).await
    }

    async fn replace(&self, entity: Counter, expected: &GenerationId) -> Result<Counter> {
        self.inner.replace(entity, expected).await
    }

    async fn remove(&self, id: &String, expected: &GenerationId) -> Result<()> {
        self.inner.remove(id, expected).await
    }

    async fn query(
        &self,
        filter: &dyn EntityFilter<Counter>,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> Result<Page<Counter>> {
        self.inner.query(filter, continuation, page_size).await
    }
}

fn counter(id: &str, value: u64) -> Counter {
    Counter {
        id: id.to_string(),
        value,
        generation_id: None,
    }
}

// ==========================================================================
// CAS RACE TESTS
// ==========================================================================

#[tokio::test]
async fn should_apply_both_concurrent_increments() -> Result<()> {
    let store = Arc::new(InterleavingStore::new(2));
    store.inner.create(counter("c", 10)).await?;
    let repo = Repository::new(store.clone() as Arc<dyn DocumentStore<Counter>>);
    let id = "c".to_string();

    let (a, b) = tokio::join!(
        repo.update(&id, |c| {
            c.value += 1;
            true
        }),
        repo.update(&id, |c| {
            c.value += 1;
            true
        }),
    );
    a?;
    b?;

    let stored = repo.find(&id).await?.unwrap();
    assert_eq!(stored.value, 12, "neither increment may be lost");
    assert_eq!(
        store.reads.load(Ordering::SeqCst),
        3,
        "exactly one update re-read after losing the race"
    );
    Ok(())
}

#[tokio::test]
async fn should_retry_upsert_as_update_after_concurrent_insert() -> Result<()> {
    let store = Arc::new(InterleavingStore::new(2));
    let repo = Repository::new(store.clone() as Arc<dyn DocumentStore<Counter>>);
    let id = "c".to_string();

    let upsert = |current: Option<Counter>| {
        Some(match current {
            None => counter("c", 1),
            Some(mut c) => {
                c.value += 1;
                c
            }
        })
    };
    let (a, b) = tokio::join!(repo.add_or_update(&id, upsert), repo.add_or_update(&id, upsert));
    a?;
    b?;

    let stored = repo.find(&id).await?.unwrap();
    assert_eq!(stored.value, 2, "loser of the insert race updated instead");
    Ok(())
}

#[tokio::test]
async fn should_recompute_mutation_on_every_attempt() -> Result<()> {
    let store = Arc::new(InterleavingStore::new(2));
    store.inner.create(counter("c", 0)).await?;
    let repo = Repository::new(store.clone() as Arc<dyn DocumentStore<Counter>>);
    let id = "c".to_string();

    // The observed prior value must come from the snapshot the successful
    // write replaced, not from the first attempt.
    let mut seen_a = None;
    let mut seen_b = None;
    let (a, b) = tokio::join!(
        repo.update(&id, |c| {
            seen_a = Some(c.value);
            c.value += 1;
            true
        }),
        repo.update(&id, |c| {
            seen_b = Some(c.value);
            c.value += 1;
            true
        }),
    );
    a?;
    b?;

    let mut seen = [seen_a.unwrap(), seen_b.unwrap()];
    seen.sort_unstable();
    assert_eq!(seen, [0, 1]);
    Ok(())
}

// ==========================================================================
// DELETE CONTRACT TESTS
// ==========================================================================

#[tokio::test]
async fn should_decline_delete_when_concurrent_update_invalidates_predicate() -> Result<()> {
    let store = Arc::new(InterleavingStore::new(2));
    store.inner.create(counter("c", 0)).await?;
    let repo = Repository::new(store.clone() as Arc<dyn DocumentStore<Counter>>);
    let id = "c".to_string();

    // Both read value 0. If the update wins, the delete retries, sees 1 and
    // declines; if the delete wins, the update fails with NotFound.
    let (deleted, updated) = tokio::join!(
        repo.delete(&id, |c| c.value == 0),
        repo.update(&id, |c| {
            c.value = 1;
            true
        }),
    );

    match (deleted?, updated) {
        (None, Ok(c)) => assert_eq!(c.value, 1),
        (Some(_), Err(e)) => assert!(e.is_not_found(), "got {e}"),
        other => panic!("inconsistent outcome: {other:?}"),
    }
    Ok(())
}
