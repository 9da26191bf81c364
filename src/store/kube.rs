//! Kubernetes-backed backup store.

use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    Api, Client,
};
use serde_json::json;

use crate::crd::{DatabaseBackup, DatabaseBackupStatus};
use crate::error::Result;
use crate::operator::ResourceIdentity;
use crate::store::BackupStore;

/// Field manager name used for status patches.
const FIELD_MANAGER: &str = "db-backup-operator";

/// Backup store reading and patching resources through the Kubernetes API.
pub struct KubeBackupStore {
    client: Client,
}

impl KubeBackupStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DatabaseBackup> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl BackupStore for KubeBackupStore {
    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<DatabaseBackup>> {
        Ok(self.api(&identity.namespace).get_opt(&identity.name).await?)
    }

    async fn update_status(
        &self,
        identity: &ResourceIdentity,
        status: DatabaseBackupStatus,
    ) -> Result<()> {
        let patch = json!({ "status": status });
        self.api(&identity.namespace)
            .patch_status(
                &identity.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await?;
        Ok(())
    }
}
