//! In-memory backup store, used by the integration tests and handy for
//! dry-running the operator without a cluster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::crd::{DatabaseBackup, DatabaseBackupStatus};
use crate::error::{Error, Result};
use crate::operator::ResourceIdentity;
use crate::store::BackupStore;

#[derive(Default)]
pub struct MemoryBackupStore {
    resources: RwLock<HashMap<ResourceIdentity, DatabaseBackup>>,
    status_writes: AtomicUsize,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: ResourceIdentity, backup: DatabaseBackup) {
        self.resources
            .write()
            .expect("memory store lock poisoned")
            .insert(identity, backup);
    }

    pub fn remove(&self, identity: &ResourceIdentity) {
        self.resources
            .write()
            .expect("memory store lock poisoned")
            .remove(identity);
    }

    /// Number of status writes performed, for no-op detection tests.
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<DatabaseBackup>> {
        Ok(self
            .resources
            .read()
            .expect("memory store lock poisoned")
            .get(identity)
            .cloned())
    }

    async fn update_status(
        &self,
        identity: &ResourceIdentity,
        status: DatabaseBackupStatus,
    ) -> Result<()> {
        let mut resources = self.resources.write().expect("memory store lock poisoned");
        let backup = resources
            .get_mut(identity)
            .ok_or_else(|| Error::NotFound(identity.to_string()))?;
        backup.status = Some(status);
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
