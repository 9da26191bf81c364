//! DatabaseBackup kind handler
//!
//! Loads the resource named by a work item, asks the state machine for its
//! next status, and persists the result when it differs from what is
//! stored. Everything else (queueing, retry pacing) is the operator core's
//! job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::backend::BackupBackend;
use crate::crd::DatabaseBackup;
use crate::error::{Error, Result};
use crate::metrics;
use crate::operator::{GroupVersionKind, Handler, Item, ResourceIdentity};
use crate::reconcilers::states;
use crate::store::BackupStore;

/// Hook invoked when a backup resource disappears from the store. External
/// artifact cleanup (removing uploaded snapshots and the like) plugs in
/// here instead of living inside the state machine.
#[async_trait]
pub trait CleanupHook: Send + Sync {
    async fn resource_deleted(&self, identity: &ResourceIdentity) -> Result<()>;
}

/// Kind handler driving DatabaseBackup resources through their lifecycle.
pub struct BackupHandler {
    store: Arc<dyn BackupStore>,
    backend: Arc<dyn BackupBackend>,
    cleanup: Option<Arc<dyn CleanupHook>>,
}

impl BackupHandler {
    pub fn new(store: Arc<dyn BackupStore>, backend: Arc<dyn BackupBackend>) -> Self {
        Self {
            store,
            backend,
            cleanup: None,
        }
    }

    pub fn with_cleanup(mut self, cleanup: Arc<dyn CleanupHook>) -> Self {
        self.cleanup = Some(cleanup);
        self
    }
}

#[async_trait]
impl Handler for BackupHandler {
    fn name(&self) -> &'static str {
        "database-backup"
    }

    fn kinds(&self) -> Vec<GroupVersionKind> {
        vec![DatabaseBackup::gvk()]
    }

    #[instrument(skip(self), fields(identity = %item.identity()))]
    async fn handle(&self, item: &Item) -> Result<()> {
        let identity = item.identity();

        let Some(backup) = self.store.get(identity).await? else {
            info!("backup resource gone");
            if let Some(cleanup) = &self.cleanup {
                cleanup.resource_deleted(identity).await?;
                metrics::CLEANUPS
                    .with_label_values(&[&identity.gvk.kind])
                    .inc();
            }
            return Ok(());
        };

        // "now" is derived per evaluation; the timed-retry rule depends on
        // it being fresh.
        let next = states::evaluate(self.backend.as_ref(), &backup, Utc::now()).await?;

        if backup.status.as_ref() == Some(&next) {
            debug!("status unchanged, skipping write");
            return Ok(());
        }

        let previous = backup
            .status
            .as_ref()
            .map(|s| s.state.to_string())
            .unwrap_or_else(|| "none".to_string());
        info!(from = %previous, to = %next.state, "state transition");
        metrics::STATE_TRANSITIONS
            .with_label_values(&[&previous, &next.state.to_string()])
            .inc();

        self.store.update_status(identity, next).await
    }
}

/// Validate a DatabaseBackup spec.
pub fn validate(backup: &DatabaseBackup) -> Result<()> {
    if backup.spec.deployment.name.is_empty() {
        return Err(Error::validation("deployment name must not be empty"));
    }

    if let Some(upload) = &backup.spec.upload {
        if upload.repository_url.is_empty() {
            return Err(Error::validation("upload repository URL must not be empty"));
        }
    }

    if let Some(download) = &backup.spec.download {
        if download.repository_url.is_empty() {
            return Err(Error::validation(
                "download repository URL must not be empty",
            ));
        }
        if download.id.is_empty() {
            return Err(Error::validation("download backup id must not be empty"));
        }
    }

    Ok(())
}
