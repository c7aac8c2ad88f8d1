//! In-memory document store for testing and embedded use.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fleet_core::{Entity, GenerationId};
use tokio::sync::RwLock;

use crate::error::{RegistryError, Result};
use crate::query::{ContinuationToken, EntityFilter, Page};
use crate::store::DocumentStore;

/// Document store backed by an ordered map.
pub struct InMemoryStore<E: Entity> {
    records: RwLock<BTreeMap<E::Id, E>>,
}

impl<E: Entity> InMemoryStore<E> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }


    /// Every stored record, in id order.
    pub async fn snapshot(&self) -> Vec<E> {
        self.records.read().await.values().cloned().collect()
    }

    fn check_generation(current: &E, expected: &GenerationId) -> Result<()> {
        if current.generation_id() == Some(expected) {
            Ok(())
        } else {
            Err(RegistryError::out_of_date(E::KIND, current.id()))
        }
    }
}

impl<E: Entity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> DocumentStore<E> for InMemoryStore<E> {
    async fn get(&self, id: &E::Id) -> Result<Option<E>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn create(&self, mut entity: E) -> Result<E> {
        let mut records = self.records.write().await;
        if records.contains_key(entity.id()) {
            return Err(RegistryError::conflict(E::KIND, entity.id()));
        }
        entity.set_generation_id(GenerationId::generate());
        records.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }

    async fn replace(&self, mut entity: E, expected: &GenerationId) -> Result<E> {
        let mut records = self.records.write().await;
        let current = records
            .get(entity.id())
            .ok_or_else(|| RegistryError::not_found(E::KIND, entity.id()))?;
        Self::check_generation(current, expected)?;

        entity.set_generation_id(GenerationId::generate());
        records.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }

    async fn remove(&self, id: &E::Id, expected: &GenerationId) -> Result<()> {
        let mut records = self.records.write().await;
        let current = records
            .get(id)
            .ok_or_else(|| RegistryError::not_found(E::KIND, id))?;
        Self::check_generation(current, expected)?;
        records.remove(id);
        Ok(())
    }

    async fn query(
        &self,
        filter: &dyn EntityFilter<E>,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> Result<Page<E>> {
        if page_size == 0 {
            return Err(RegistryError::invalid_argument("page_size", "must be > 0"));
        }

        let records = self.records.read().await;
        let mut matching = records
            .iter()
            .filter(|(id, _)| continuation.is_none_or(|token| id.to_string().as_str() > token.as_str()))
            .map(|(_, entity)| entity)
            .filter(|entity| filter.matches(entity));

        let items: Vec<E> = matching.by_ref().take(page_size).cloned().collect();
        let continuation = match (matching.next(), items.last()) {
            (Some(_), Some(last)) => Some(ContinuationToken::new(last.id().to_string())),
            _ => None,
        };
        Ok(Page {
            items,
            continuation,
        })
    }
}
