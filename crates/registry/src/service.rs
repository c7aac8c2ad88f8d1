//! Explicit application registration.

use std::collections::BTreeSet;
use std::sync::Arc;

use fleet_core::lifecycle::admit;
use fleet_core::{
    Application, ApplicationId, Endpoint, GenerationId, OperationContext, Patchable, SiteId,
};
use fleet_events::{EventBroker, EventKind, RegistryEvent};
use tracing::{debug, info};

use crate::cascade;
use crate::error::{RegistryError, Result};
use crate::query::{ApplicationFilter, ContinuationToken, EndpointFilter, MatchAll, Page};
use crate::repository::Repository;

/// Registration surface over the application and endpoint repositories.
#[derive(Clone)]
pub struct ApplicationRegistry {
    applications: Repository<Application>,
    endpoints: Repository<Endpoint>,
    broker: Arc<EventBroker>,
}

impl ApplicationRegistry {
    pub fn new(
        applications: Repository<Application>,
        endpoints: Repository<Endpoint>,
        broker: Arc<EventBroker>,
    ) -> Self {
        Self {
            applications,
            endpoints,
            broker,
        }
    }

    /// Register an application.
    ///
    /// Without a preset id the id is derived from the application's identity
    /// and a collision means the application is already registered. A preset
    /// id that collides is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank URI and `Conflict` if the
    /// application is already registered.
    pub async fn register(
        &self,
        request: Application,
        context: &OperationContext,
    ) -> Result<Application> {
        request.validate()?;

        let mut application = admit(&request, context);
        let stored = if application.id.is_blank() {
            application.id = application.derive_id();
            self.applications.add(application).await?
        } else {
            self.applications
                .add_with_fallback_id(application, ApplicationId::generate)
                .await?
        };

        info!(
            application_id = %stored.id,
            application_uri = %stored.application_uri,
            "Registered application"
        );
        self.notify(EventKind::New, stored.clone(), context).await;
        Ok(stored)
    }

    /// Get an application.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such application exists.
    pub async fn get(&self, id: &ApplicationId) -> Result<Application> {
        self.applications
            .find(id)
            .await?
            .ok_or_else(|| RegistryError::not_found("application", id))
    }

    /// Merge `patch` into an application. Fields absent from the patch are
    /// kept, empty values clear.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such application exists.
    pub async fn update(
        &self,
        id: &ApplicationId,
        patch: &Application,
        context: &OperationContext,
    ) -> Result<Application> {
        let mut changed = false;
        let updated = self
            .applications
            .update(id, |current| {
                changed = current.patch(patch);
                if changed {
                    current.stamp_updated(context);
                }
                changed
            })
            .await?;

        if changed {
            debug!(application_id = %id, "Updated application");
            self.notify(EventKind::Updated, updated.clone(), context).await;
        }
        Ok(updated)
    }

    /// Delete an application and its endpoints if its generation still
    /// equals `generation_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such application exists and `OutOfDate` if
    /// it changed since `generation_id` was read.
    pub async fn unregister(
        &self,
        id: &ApplicationId,
        generation_id: &GenerationId,
        context: &OperationContext,
    ) -> Result<Application> {
        let removed = self
            .applications
            .delete(id, |current| current.generation_id.as_ref() == Some(generation_id))
            .await?
            .ok_or_else(|| RegistryError::out_of_date("application", id))?;

        let endpoints =
            cascade::delete_endpoints(&self.endpoints, &self.broker, id, context).await?;
        info!(application_id = %id, endpoints, "Unregistered application");

        self.notify(EventKind::Deleted, removed.clone(), context).await;
        Ok(removed)
    }

    /// One page of applications matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero page size.
    pub async fn list(
        &self,
        filter: &ApplicationFilter,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> Result<Page<Application>> {
        self.applications
            .query(filter, continuation, page_size)
            .await
    }

    /// Every site that owns at least one application.
    ///
    /// # Errors
    ///
    /// Returns the store's error on backend failure.
    pub async fn list_sites(&self) -> Result<BTreeSet<SiteId>> {
        Ok(self
            .applications
            .query_all(&MatchAll)
            .await?
            .into_iter()
            .filter_map(|app| app.site_id)
            .collect())
    }

    /// Every endpoint of an application.
    ///
    /// # Errors
    ///
    /// Returns the store's error on backend failure.
    pub async fn list_endpoints(&self, id: &ApplicationId) -> Result<Vec<Endpoint>> {
        self.endpoints
            .query_all(&EndpointFilter::by_application(id))
            .await
    }

    async fn notify(&self, kind: EventKind, application: Application, context: &OperationContext) {
        self.broker
            .notify_all(RegistryEvent::new(kind, application, context.clone()))
            .await;
    }
}
