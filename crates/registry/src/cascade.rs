//! Child endpoint removal shared by unregistration and purging.

use fleet_core::{ApplicationId, Endpoint, OperationContext, ResultExt};
use fleet_events::{EventBroker, EventKind, RegistryEvent};
use tracing::debug;

use crate::error::Result;
use crate::query::EndpointFilter;
use crate::repository::Repository;

/// Delete every endpoint of `application_id`, notifying `Deleted` once per
/// removed endpoint. Endpoints that vanish concurrently are skipped, other
/// per-endpoint failures are logged and skipped.
///
/// Returns the number of endpoints deleted.
///
/// # Errors
///
/// Returns an error only if the endpoints cannot be listed.
pub async fn delete_endpoints(
    endpoints: &Repository<Endpoint>,
    broker: &EventBroker,
    application_id: &ApplicationId,
    context: &OperationContext,
) -> Result<usize> {
    let children = endpoints
        .query_all(&EndpointFilter::by_application(application_id))
        .await?;

    let mut deleted: usize = 0;
    for child in children {
        let outcome = match endpoints.delete(&child.id, |_| true).await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        };
        if let Some(Some(removed)) = outcome.into_option_logged("delete endpoint") {
            broker
                .notify_all(RegistryEvent::new(EventKind::Deleted, removed, context.clone()))
                .await;
            deleted = deleted.saturating_add(1);
        }
    }

    debug!(%application_id, deleted, "Deleted application endpoints");
    Ok(deleted)
}
