//! Deletion of applications that have been lost for longer than a retention
//! window.

use std::sync::Arc;
use std::time::Duration;

use fleet_core::lifecycle::is_stale;
use fleet_core::{Application, Endpoint, OperationContext, ResultExt};
use fleet_events::{EventBroker, EventKind, RegistryEvent};
use fleet_registry::{cascade, ApplicationFilter, Repository};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Purge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    /// Applications fetched per page.
    pub page_size: usize,
    /// How long an application may stay lost before it is deleted.
    #[serde(with = "fleet_core::duration_secs")]
    pub retention: Duration,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl PurgeConfig {
    /// Check the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero page size.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::invalid_config("purge page_size must be > 0"));
        }
        Ok(())
    }
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Applications examined.
    pub scanned: usize,
    pub deleted: usize,
    /// Stale when listed but rediscovered or gone by delete time.
    pub skipped: usize,
    pub failed: usize,
}

/// Pages through the registry deleting long-lost applications.
pub struct PurgeSweeper {
    applications: Repository<Application>,
    endpoints: Repository<Endpoint>,
    broker: Arc<EventBroker>,
    config: PurgeConfig,
}

impl PurgeSweeper {
    pub fn new(
        applications: Repository<Application>,
        endpoints: Repository<Endpoint>,
        broker: Arc<EventBroker>,
        config: PurgeConfig,
    ) -> Self {
        Self {
            applications,
            endpoints,
            broker,
            config,
        }
    }

    /// Sweep with the configured retention window.
    ///
    /// # Errors
    ///
    /// See [`PurgeSweeper::purge`].
    pub async fn purge_expired(&self, context: &OperationContext) -> Result<PurgeReport> {
        self.purge(self.config.retention, context).await
    }

    /// Delete every application lost since before `context.time - not_seen_for`,
    /// along with its endpoints.
    ///
    /// The staleness check is repeated at delete time, so an application
    /// rediscovered while the sweep runs survives.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the window is out of range and the
    /// registry error if a page cannot be read. Per-application failures are
    /// logged and counted.
    pub async fn purge(
        &self,
        not_seen_for: Duration,
        context: &OperationContext,
    ) -> Result<PurgeReport> {
        let window = chrono::Duration::from_std(not_seen_for)
            .map_err(|e| Error::invalid_argument("not_seen_for", e.to_string()))?;
        let cutoff = context
            .time
            .checked_sub_signed(window)
            .ok_or_else(|| Error::invalid_argument("not_seen_for", "window exceeds time range"))?;

        info!(%cutoff, "Starting purge");

        let filter = ApplicationFilter::new();
        let mut report = PurgeReport::default();
        let mut continuation = None;
        loop {
            let page = self
                .applications
                .query(&filter, continuation.as_ref(), self.config.page_size)
                .await?;
            report.scanned = report.scanned.saturating_add(page.items.len());

            for app in page.items.into_iter().filter(|app| is_stale(app, cutoff)) {
                self.purge_one(app, cutoff, context, &mut report).await;
            }

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            "Purge complete"
        );
        Ok(report)
    }

    async fn purge_one(
        &self,
        app: Application,
        cutoff: chrono::DateTime<chrono::Utc>,
        context: &OperationContext,
        report: &mut PurgeReport,
    ) {
        let deleted = match self
            .applications
            .delete(&app.id, |current| is_stale(current, cutoff))
            .await
        {
            Ok(Some(deleted)) => deleted,
            Ok(None) => {
                debug!(application_id = %app.id, "Application rediscovered, not purged");
                report.skipped = report.skipped.saturating_add(1);
                return;
            }
            Err(e) if e.is_not_found() => {
                report.skipped = report.skipped.saturating_add(1);
                return;
            }
            Err(e) => {
                warn!(application_id = %app.id, error = %e, "Failed to purge application");
                report.failed = report.failed.saturating_add(1);
                return;
            }
        };

        let endpoints = cascade::delete_endpoints(&self.endpoints, &self.broker, &deleted.id, context)
            .await
            .into_option_logged("purge endpoints")
            .unwrap_or_default();
        debug!(application_id = %deleted.id, endpoints, "Purged application");

        self.broker
            .notify_all(RegistryEvent::new(EventKind::Deleted, deleted, context.clone()))
            .await;
        report.deleted = report.deleted.saturating_add(1);
    }

    /// Get the configuration.
    pub const fn config(&self) -> &PurgeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retention_is_a_week() {
        assert_eq!(PurgeConfig::default().retention, Duration::from_secs(604_800));
    }

    #[test]
    fn test_zero_page_size_is_invalid() {
        let config = PurgeConfig {
            page_size: 0,
            ..PurgeConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
