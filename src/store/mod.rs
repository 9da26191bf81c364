//! Resource store boundary.
//!
//! The operator reads backup resources and writes their status subresource
//! through this trait; the wire protocol to the control plane lives behind
//! it. Stale status writes fail as store errors and are retried via
//! re-read.

mod kube;
mod memory;

pub use kube::KubeBackupStore;
pub use memory::MemoryBackupStore;

use async_trait::async_trait;

use crate::crd::{DatabaseBackup, DatabaseBackupStatus};
use crate::error::Result;
use crate::operator::ResourceIdentity;

/// Read/write access to DatabaseBackup resources.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Fetch the resource, `None` if it no longer exists.
    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<DatabaseBackup>>;

    /// Persist a new status through the status subresource.
    async fn update_status(
        &self,
        identity: &ResourceIdentity,
        status: DatabaseBackupStatus,
    ) -> Result<()>;
}
