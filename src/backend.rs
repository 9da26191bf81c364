//! Boundary to the database deployment's snapshot machinery.
//!
//! The operator core never moves backup bytes itself; it asks a
//! [`BackupBackend`] to create, upload, or download snapshots and folds the
//! outcome into the resource's status. Backend failures carry their own
//! classification so the state machine can tell a busy backend apart from a
//! rejected request.

use async_trait::async_trait;
use thiserror::Error;

use crate::crd::DatabaseBackup;

/// Backend failure classification.
///
/// Transient failures leave the resource in its current state and are
/// retried by the operator's backoff; permanent failures move the resource
/// to `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("permanent backend error: {0}")]
    Permanent(String),
}

impl BackendError {
    pub fn transient(msg: impl Into<String>) -> Self {
        BackendError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        BackendError::Permanent(msg.into())
    }
}

/// Snapshot operations against the target database deployment.
#[async_trait]
pub trait BackupBackend: Send + Sync {
    /// Whether the deployment referenced by the backup is ready to take
    /// snapshots.
    async fn deployment_ready(&self, backup: &DatabaseBackup) -> Result<bool, BackendError>;

    /// Create a snapshot of the deployment.
    async fn create_snapshot(&self, backup: &DatabaseBackup) -> Result<(), BackendError>;

    /// Transfer the snapshot to the remote repository named in the spec.
    async fn upload_snapshot(&self, backup: &DatabaseBackup) -> Result<(), BackendError>;

    /// Fetch a previously uploaded snapshot from the remote repository.
    async fn download_snapshot(&self, backup: &DatabaseBackup) -> Result<(), BackendError>;
}

/// Placeholder backend wired in until the database admin API integration
/// lands. Reports the deployment as ready and completes every snapshot
/// operation immediately.
pub struct NoopBackend;

#[async_trait]
impl BackupBackend for NoopBackend {
    async fn deployment_ready(&self, _backup: &DatabaseBackup) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn create_snapshot(&self, _backup: &DatabaseBackup) -> Result<(), BackendError> {
        // TODO: call the deployment's snapshot-create endpoint once the
        // admin API client is available.
        Ok(())
    }

    async fn upload_snapshot(&self, _backup: &DatabaseBackup) -> Result<(), BackendError> {
        Ok(())
    }

    async fn download_snapshot(&self, _backup: &DatabaseBackup) -> Result<(), BackendError> {
        Ok(())
    }
}
