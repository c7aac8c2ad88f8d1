//! Retention sweep over lost applications.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{app_id, at, endpoint_id, observe, pass_of, Fleet};
use fleet_core::{Application, ApplicationId, GenerationId};
use fleet_events::EventKind;
use fleet_reconciler::{DiscoveryScope, PurgeConfig, PurgeReport, PurgeSweeper, Result};
use fleet_registry::{ContinuationToken, DocumentStore, EntityFilter, InMemoryStore, Page};

const MINUTE: Duration = Duration::from_secs(60);

fn sweeper(fleet: &Fleet, config: PurgeConfig) -> PurgeSweeper {
    PurgeSweeper::new(
        fleet.applications.clone(),
        fleet.endpoints.clone(),
        Arc::clone(&fleet.broker),
        config,
    )
}

/// Two applications observed at minute 0, the lathe lost at minute 10.
async fn lose_lathe(fleet: &Fleet, scope: &DiscoveryScope) -> Result<()> {
    fleet
        .pass(
            scope,
            &at(0),
            pass_of(vec![
                observe("urn:press", &[]),
                observe("urn:lathe", &["opc.tcp://lathe:4840"]),
            ]),
        )
        .await?;
    fleet.pass(scope, &at(10), observe("urn:press", &[])).await?;
    Ok(())
}

#[tokio::test]
async fn should_delete_application_lost_beyond_window() -> Result<()> {
    let fleet = Fleet::new().await;
    let scope = DiscoveryScope::new("d1");
    lose_lathe(&fleet, &scope).await?;
    let lathe = app_id(&scope, "urn:lathe");
    let endpoint = endpoint_id(&scope, "urn:lathe", "opc.tcp://lathe:4840");

    let report = sweeper(&fleet, PurgeConfig::default())
        .purge(30 * MINUTE, &at(60))
        .await?;

    assert_eq!(
        report,
        PurgeReport {
            scanned: 2,
            deleted: 1,
            skipped: 0,
            failed: 0,
        }
    );
    assert!(fleet.application(&lathe).await.is_none());
    assert!(fleet.endpoint(&endpoint).await.is_none(), "endpoints cascade");
    assert!(fleet.application(&app_id(&scope, "urn:press")).await.is_some());
    assert_eq!(fleet.recorder.count(EventKind::Deleted, lathe.as_str()).await, 1);
    assert_eq!(fleet.recorder.count(EventKind::Deleted, endpoint.as_str()).await, 1);
    Ok(())
}

#[tokio::test]
async fn should_keep_application_lost_within_window() -> Result<()> {
    let fleet = Fleet::new().await;
    let scope = DiscoveryScope::new("d1");
    lose_lathe(&fleet, &scope).await?;

    let report = sweeper(&fleet, PurgeConfig::default())
        .purge(30 * MINUTE, &at(30))
        .await?;

    assert_eq!(report.deleted, 0);
    assert_eq!(fleet.all_applications().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn should_purge_with_configured_retention() -> Result<()> {
    let fleet = Fleet::new().await;
    let scope = DiscoveryScope::new("d1");
    lose_lathe(&fleet, &scope).await?;
    let config = PurgeConfig {
        retention: 5 * MINUTE,
        ..PurgeConfig::default()
    };

    let report = sweeper(&fleet, config).purge_expired(&at(20)).await?;

    assert_eq!(report.deleted, 1);
    Ok(())
}

#[tokio::test]
async fn should_page_through_every_application() -> Result<()> {
    let fleet = Fleet::new().await;
    let scope = DiscoveryScope::new("d1");
    let uris: Vec<String> = (0..5).map(|i| format!("urn:machine-{i}")).collect();
    fleet
        .pass(
            &scope,
            &at(0),
            pass_of(uris.iter().map(|uri| observe(uri, &[])).collect()),
        )
        .await?;
    fleet.pass(&scope, &at(10), Vec::new()).await?;

    let config = PurgeConfig {
        page_size: 2,
        ..PurgeConfig::default()
    };
    let report = sweeper(&fleet, config).purge(MINUTE, &at(60)).await?;

    assert_eq!(report.scanned, 5);
    assert_eq!(report.deleted, 5);
    assert!(fleet.all_applications().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn should_reject_window_out_of_range() {
    let fleet = Fleet::new().await;
    let result = sweeper(&fleet, PurgeConfig::default())
        .purge(Duration::MAX, &at(0))
        .await;
    assert!(result.is_err());
}

// ==========================================================================
// REDISCOVERY DURING SWEEP
// ==========================================================================

/// Store that re-finds every listed application right after the first
/// query returns, as if a discovery pass committed in between.
struct RediscoveringStore {
    inner: InMemoryStore<Application>,
    armed: AtomicBool,
}

#[async_trait]
impl DocumentStore<Application> for RediscoveringStore {
    async fn get(&self, id: &ApplicationId) -> fleet_registry::Result<Option<Application>> {
        self.inner.get(id).await
    }

    async fn create(&self, entity: Application) -> fleet_registry::Result<Application> {
        self.inner.create(entity).await
    }

    async fn replace(
        &self,
        entity: Application,
        expected: &GenerationId,
    ) -> fleet_registry::Result<Application> {
        self.inner.replace(entity, expected).await
    }

    async fn remove(&self, id: &ApplicationId, expected: &GenerationId) -> fleet_registry::Result<()> {
        self.inner.remove(id, expected).await
    }

    async fn query(
        &self,
        filter: &dyn EntityFilter<Application>,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> fleet_registry::Result<Page<Application>> {
        let page = self.inner.query(filter, continuation, page_size).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            for listed in &page.items {
                let mut refound = listed.clone();
                refound.not_seen_since = None;
                let generation = listed.generation_id.clone().unwrap();
                self.inner.replace(refound, &generation).await?;
            }
        }
        Ok(page)
    }
}

#[tokio::test]
async fn should_spare_application_rediscovered_mid_sweep() -> Result<()> {
    let store = Arc::new(RediscoveringStore {
        inner: InMemoryStore::new(),
        armed: AtomicBool::new(false),
    });
    let dyn_store: Arc<dyn DocumentStore<Application>> = store.clone();
    let fleet = Fleet::over(dyn_store).await;
    let scope = DiscoveryScope::new("d1");
    lose_lathe(&fleet, &scope).await?;
    let lathe = app_id(&scope, "urn:lathe");

    store.armed.store(true, Ordering::SeqCst);
    let report = sweeper(&fleet, PurgeConfig::default())
        .purge(30 * MINUTE, &at(60))
        .await?;

    assert_eq!(report.deleted, 0);
    assert_eq!(report.skipped, 1);
    let survivor = fleet.application(&lathe).await.unwrap();
    assert!(survivor.not_seen_since.is_none());
    assert_eq!(fleet.recorder.count(EventKind::Deleted, lathe.as_str()).await, 0);
    Ok(())
}
