//! DatabaseBackup Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::operator::{GroupVersionKind, Identified};

/// DatabaseBackup resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dbops.io",
    version = "v1alpha1",
    kind = "DatabaseBackup",
    plural = "databasebackups",
    singular = "databasebackup",
    shortname = "dbb",
    namespaced,
    status = "DatabaseBackupStatus",
    printcolumn = r#"{"name": "State", "type": "string", "jsonPath": ".status.state"}"#,
    printcolumn = r#"{"name": "Available", "type": "boolean", "jsonPath": ".status.available"}"#,
    printcolumn = r#"{"name": "Message", "type": "string", "jsonPath": ".status.message"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseBackupSpec {
    /// Database deployment to snapshot
    pub deployment: DeploymentRef,

    /// Remote repository to upload the snapshot to after creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadSpec>,

    /// Remote backup to download instead of creating a new snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadSpec>,

    /// Snapshot tuning options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<BackupOptions>,
}

/// Reference to the database deployment being backed up
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRef {
    /// Deployment name (same namespace as the backup resource)
    pub name: String,
}

/// Upload target specification
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadSpec {
    /// Repository URL (e.g. s3://bucket/path)
    pub repository_url: String,

    /// Secret holding repository credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<String>,
}

/// Download source specification
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSpec {
    /// Repository URL (e.g. s3://bucket/path)
    pub repository_url: String,

    /// Identifier of the remote backup to fetch
    pub id: String,

    /// Secret holding repository credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<String>,
}

/// Snapshot tuning options
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupOptions {
    /// Snapshot timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Force a snapshot even if the deployment reports transactions in
    /// progress
    #[serde(default)]
    pub force: bool,
}

/// Lifecycle states of a backup resource.
///
/// `Ready` and `Failed` are terminal for the happy and error paths;
/// `Deleted` is reached only through external deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum BackupState {
    #[default]
    Pending,
    Scheduled,
    Create,
    Upload,
    Download,
    DownloadError,
    Ready,
    Failed,
    Deleted,
}

impl std::fmt::Display for BackupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackupState::Pending => "Pending",
            BackupState::Scheduled => "Scheduled",
            BackupState::Create => "Create",
            BackupState::Upload => "Upload",
            BackupState::Download => "Download",
            BackupState::DownloadError => "DownloadError",
            BackupState::Ready => "Ready",
            BackupState::Failed => "Failed",
            BackupState::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// DatabaseBackup status, the only part of the resource the operator writes
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseBackupStatus {
    /// Current lifecycle state
    pub state: BackupState,

    /// True only when the backup is confirmed usable (state Ready)
    #[serde(default)]
    pub available: bool,

    /// Timestamp of the last state transition
    pub time: DateTime<Utc>,

    /// Diagnostic for the current state, empty on success states
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl DatabaseBackupStatus {
    /// Status stamped for a fresh transition at `now`.
    pub fn transition(
        state: BackupState,
        available: bool,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            state,
            available,
            time: now,
            message: message.into(),
        }
    }

    /// Initial status for a resource observed with no status yet.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self::transition(BackupState::Pending, false, "", now)
    }

    /// Terminal failure with a diagnostic message.
    pub fn failed(message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::transition(BackupState::Failed, false, message, now)
    }
}

impl DatabaseBackup {
    /// Kind coordinates used for informer and handler registration.
    pub fn gvk() -> GroupVersionKind {
        GroupVersionKind::of::<DatabaseBackup>()
    }
}

impl Identified for DatabaseBackup {
    fn resource_namespace(&self) -> Option<String> {
        self.metadata.namespace.clone()
    }

    fn resource_name(&self) -> Option<String> {
        self.metadata.name.clone()
    }
}
