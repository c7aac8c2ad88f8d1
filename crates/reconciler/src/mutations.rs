//! CAS-protected lifecycle mutations shared by the application and endpoint
//! reconcilers.
//!
//! Every closure resets its captured outcome before touching the snapshot, so
//! after a retried write the captured value describes the attempt that
//! actually committed. Notifications are derived from that value only.

use std::fmt::Display;
use std::future::Future;

use fleet_core::lifecycle::{admit, lose, observe};
use fleet_core::{Change, Discoverable, DiscovererId, Entity, LogicalIdentity, OperationContext, Patchable, Transition};
use fleet_events::{EventBroker, EventKind, RegistryEvent, Subject};
use fleet_registry::{RegistryError, Repository};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::types::Outcome;

/// Records the reconcilers know how to mutate.
pub trait Tracked: Entity + Discoverable + Patchable + LogicalIdentity + Into<Subject> {}

impl<E> Tracked for E where E: Entity + Discoverable + Patchable + LogicalIdentity + Into<Subject> {}

/// `Ok(None)` means the record vanished before the write and was skipped.
pub type Applied = Result<Option<Outcome>, RegistryError>;

/// Mark a record lost if `owner` still owns it at write time.
///
/// `owner` is the owner the caller listed the record under. A record claimed
/// by anyone else in the meantime is left alone.
pub async fn mark_lost<E: Tracked>(
    repository: &Repository<E>,
    broker: &EventBroker,
    id: &E::Id,
    owner: Option<&DiscovererId>,
    context: &OperationContext,
) -> Applied {
    let mut change = Change::default();
    let result = repository
        .update(id, |current| {
            change = Change::default();
            if current.discoverer_id() != owner {
                return false;
            }
            change = lose(current, context);
            change.is_write()
        })
        .await;

    let stored = match result {
        Ok(stored) => stored,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };
    notify_change(broker, stored, change, context).await;
    Ok(Some(Outcome::of_change(change)))
}

/// Insert an observed record, or merge it into the record that already holds
/// its id (another pass inserted it, or another discoverer owned it).
pub async fn upsert<E: Tracked>(
    repository: &Repository<E>,
    broker: &EventBroker,
    template: &E,
    context: &OperationContext,
) -> Applied {
    let mut inserted = false;
    let mut change = Change::default();
    let stored = repository
        .add_or_update(template.id(), |current| {
            change = Change::default();
            inserted = current.is_none();
            match current {
                None => Some(admit(template, context)),
                Some(mut existing) => {
                    change = observe(&mut existing, template, context);
                    change.is_write().then_some(existing)
                }
            }
        })
        .await?;

    let Some(stored) = stored else {
        return Ok(None);
    };
    if inserted {
        notify(broker, EventKind::New, stored, context).await;
        return Ok(Some(Outcome::Added));
    }
    notify_change(broker, stored, change, context).await;
    Ok(Some(Outcome::of_change(change)))
}

/// Re-find a registered record and merge the new observation into it.
pub async fn refresh<E: Tracked>(
    repository: &Repository<E>,
    broker: &EventBroker,
    id: &E::Id,
    observed: &E,
    context: &OperationContext,
) -> Applied {
    let mut change = Change::default();
    let result = repository
        .update(id, |current| {
            change = observe(current, observed, context);
            change.is_write()
        })
        .await;

    let stored = match result {
        Ok(stored) => stored,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };
    notify_change(broker, stored, change, context).await;
    Ok(Some(Outcome::of_change(change)))
}

/// Turn a mutation result into an outcome, logging anything unexpected.
/// `None` means nothing was stored and no cascade should follow.
pub fn settle(result: Applied, kind: &str, id: &dyn Display) -> Option<Outcome> {
    match result {
        Ok(Some(outcome)) => Some(outcome),
        Ok(None) => {
            debug!(kind, %id, "Record vanished, treating as reconciled");
            None
        }
        Err(e) => {
            warn!(kind, %id, error = %e, "Skipping record after failed mutation");
            None
        }
    }
}

/// Run `f` over `items` with at most `limit` in flight and collect the
/// results, e.g. into `ReconcileCounters`.
pub async fn for_each_bounded<T, F, Fut, C>(items: Vec<T>, limit: usize, f: F) -> C
where
    F: FnMut(T) -> Fut,
    Fut: Future,
    C: Default + Extend<Fut::Output>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

async fn notify_change<E: Tracked>(
    broker: &EventBroker,
    stored: E,
    change: Change,
    context: &OperationContext,
) {
    let transition = match change.transition {
        Transition::Unchanged => None,
        Transition::Lost => Some(EventKind::Lost),
        Transition::Found => Some(EventKind::Found),
    };
    match (change.content_changed, transition) {
        (false, None) => {}
        (true, None) => notify(broker, EventKind::Updated, stored, context).await,
        (false, Some(kind)) => notify(broker, kind, stored, context).await,
        (true, Some(kind)) => {
            notify(broker, EventKind::Updated, stored.clone(), context).await;
            notify(broker, kind, stored, context).await;
        }
    }
}

async fn notify<E: Tracked>(broker: &EventBroker, kind: EventKind, stored: E, context: &OperationContext) {
    broker
        .notify_all(RegistryEvent::new(kind, stored, context.clone()))
        .await;
}
