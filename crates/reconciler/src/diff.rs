//! Three-way partition of registered and observed records.

use std::collections::BTreeMap;

use either::Either;
use fleet_core::LogicalIdentity;
use itertools::Itertools;

/// Registered and observed records split by logical identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<E> {
    /// Registered but not observed.
    pub to_remove: Vec<E>,
    /// Observed but not registered.
    pub to_add: Vec<E>,
    /// Observed again: `(registered, observed)`.
    pub to_reconcile: Vec<(E, E)>,
}

impl<E> Partition<E> {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty() && self.to_reconcile.is_empty()
    }
}

/// Keep the first record per logical identity, in input order.
pub fn dedup_by_identity<E>(records: impl IntoIterator<Item = E>) -> Vec<E>
where
    E: LogicalIdentity,
    E::Key: Ord + Clone + std::hash::Hash,
{
    records
        .into_iter()
        .unique_by(LogicalIdentity::logical_key)
        .collect()
}

/// Partition `existing` against `found`. Volatile fields never influence the
/// result; only logical keys are compared. Both inputs are expected to be
/// free of duplicate keys; for duplicates the first record wins.
pub fn partition<E>(existing: Vec<E>, found: Vec<E>) -> Partition<E>
where
    E: LogicalIdentity,
    E::Key: Ord + Clone + std::hash::Hash,
{
    let mut registered: BTreeMap<E::Key, E> = BTreeMap::new();
    for record in existing {
        registered.entry(record.logical_key()).or_insert(record);
    }

    let (to_reconcile, to_add): (Vec<(E, E)>, Vec<E>) =
        dedup_by_identity(found)
            .into_iter()
            .partition_map(|observed| match registered.remove(&observed.logical_key()) {
                Some(current) => Either::Left((current, observed)),
                None => Either::Right(observed),
            });

    Partition {
        to_remove: registered.into_values().collect(),
        to_add,
        to_reconcile,
    }
}

#[cfg(test)]
mod tests {
    use fleet_core::{Application, GenerationId};

    use super::*;

    fn app(uri: &str) -> Application {
        Application::new(uri).with_discoverer("d1")
    }

    #[test]
    fn should_split_into_three_disjoint_groups() {
        let existing = vec![app("urn:a"), app("urn:b")];
        let found = vec![app("urn:b"), app("urn:c")];

        let p = partition(existing, found);

        assert_eq!(p.to_remove.len(), 1);
        assert_eq!(p.to_remove.first().map(|a| a.application_uri.as_str()), Some("urn:a"));
        assert_eq!(p.to_add.first().map(|a| a.application_uri.as_str()), Some("urn:c"));
        assert_eq!(p.to_reconcile.len(), 1);
    }

    #[test]
    fn should_ignore_volatile_fields() {
        let mut stored = app("urn:Plant:Press");
        stored.generation_id = Some(GenerationId::generate());
        stored.not_seen_since = Some(chrono::Utc::now());

        let p = partition(vec![stored], vec![app("urn:plant:press/")]);

        assert!(p.to_remove.is_empty());
        assert!(p.to_add.is_empty());
        assert_eq!(p.to_reconcile.len(), 1);
    }

    #[test]
    fn should_keep_first_duplicate() {
        let first = app("urn:a").with_name("first");
        let second = app("urn:a").with_name("second");

        let found = dedup_by_identity(vec![first, second]);

        assert_eq!(found.len(), 1);
        assert_eq!(found.first().and_then(|a| a.application_name.as_deref()), Some("first"));
    }

    #[test]
    fn should_be_empty_for_empty_inputs() {
        assert!(partition::<Application>(Vec::new(), Vec::new()).is_empty());
    }
}
