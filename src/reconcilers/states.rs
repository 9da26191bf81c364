//! Backup lifecycle state machine.
//!
//! Each state maps to one transition function; the exhaustive match in
//! [`evaluate`] is the transition table. Transition functions never block
//! on anything except the snapshot backend, and they never write status
//! themselves: they return the next status value and the caller decides
//! whether it differs from the stored one.

use chrono::{DateTime, Duration, Utc};

use crate::backend::{BackendError, BackupBackend};
use crate::crd::{BackupState, DatabaseBackup, DatabaseBackupStatus};
use crate::error::Result;
use crate::reconcilers::backup::validate;

/// Delay before a failed download is attempted again.
pub const DOWNLOAD_RETRY_SECS: i64 = 60;

/// Compute the next status for a backup resource.
///
/// `now` must be taken at evaluation time; the timed-retry rule compares it
/// against the stored transition timestamp. A resource without a status is
/// treated as freshly `Pending`.
pub async fn evaluate(
    backend: &dyn BackupBackend,
    backup: &DatabaseBackup,
    now: DateTime<Utc>,
) -> Result<DatabaseBackupStatus> {
    let status = backup
        .status
        .clone()
        .unwrap_or_else(|| DatabaseBackupStatus::fresh(now));

    match status.state {
        BackupState::Pending => state_pending(backup, now),
        BackupState::Scheduled => state_scheduled(backend, backup, &status, now).await,
        BackupState::Create => state_create(backend, backup, now).await,
        BackupState::Upload => state_upload(backend, backup, now).await,
        BackupState::Download => state_download(backend, backup, now).await,
        BackupState::DownloadError => Ok(state_download_error(&status, now)),
        // Terminal states never transition on their own.
        BackupState::Ready | BackupState::Failed | BackupState::Deleted => Ok(status),
    }
}

fn state_pending(backup: &DatabaseBackup, now: DateTime<Utc>) -> Result<DatabaseBackupStatus> {
    match validate(backup) {
        Ok(()) => Ok(DatabaseBackupStatus::transition(
            BackupState::Scheduled,
            false,
            "",
            now,
        )),
        // Invalid specs are structural: park the resource in Failed rather
        // than retrying forever.
        Err(err) => Ok(DatabaseBackupStatus::failed(err.to_string(), now)),
    }
}

async fn state_scheduled(
    backend: &dyn BackupBackend,
    backup: &DatabaseBackup,
    status: &DatabaseBackupStatus,
    now: DateTime<Utc>,
) -> Result<DatabaseBackupStatus> {
    match backend.deployment_ready(backup).await {
        // Deployment not ready yet; stay put without a status write.
        Ok(false) => return Ok(status.clone()),
        Ok(true) => {}
        Err(BackendError::Permanent(msg)) => return Ok(DatabaseBackupStatus::failed(msg, now)),
        Err(err @ BackendError::Transient(_)) => return Err(err.into()),
    }

    let next = if backup.spec.download.is_some() {
        BackupState::Download
    } else {
        BackupState::Create
    };
    Ok(DatabaseBackupStatus::transition(next, false, "", now))
}

async fn state_create(
    backend: &dyn BackupBackend,
    backup: &DatabaseBackup,
    now: DateTime<Utc>,
) -> Result<DatabaseBackupStatus> {
    match backend.create_snapshot(backup).await {
        Ok(()) => {
            if backup.spec.upload.is_some() {
                Ok(DatabaseBackupStatus::transition(
                    BackupState::Upload,
                    false,
                    "",
                    now,
                ))
            } else {
                Ok(DatabaseBackupStatus::transition(
                    BackupState::Ready,
                    true,
                    "",
                    now,
                ))
            }
        }
        Err(BackendError::Permanent(msg)) => Ok(DatabaseBackupStatus::failed(msg, now)),
        Err(err @ BackendError::Transient(_)) => Err(err.into()),
    }
}

async fn state_upload(
    backend: &dyn BackupBackend,
    backup: &DatabaseBackup,
    now: DateTime<Utc>,
) -> Result<DatabaseBackupStatus> {
    match backend.upload_snapshot(backup).await {
        Ok(()) => Ok(DatabaseBackupStatus::transition(
            BackupState::Ready,
            true,
            "",
            now,
        )),
        Err(BackendError::Permanent(msg)) => Ok(DatabaseBackupStatus::failed(msg, now)),
        Err(err @ BackendError::Transient(_)) => Err(err.into()),
    }
}

async fn state_download(
    backend: &dyn BackupBackend,
    backup: &DatabaseBackup,
    now: DateTime<Utc>,
) -> Result<DatabaseBackupStatus> {
    match backend.download_snapshot(backup).await {
        Ok(()) => Ok(DatabaseBackupStatus::transition(
            BackupState::Ready,
            true,
            "",
            now,
        )),
        // Downloads are always re-attempted; the timed retry below paces
        // them.
        Err(err) => Ok(DatabaseBackupStatus::transition(
            BackupState::DownloadError,
            false,
            err.to_string(),
            now,
        )),
    }
}

/// Timed retry: re-attempt the download once the delay has fully elapsed
/// since the recorded transition, otherwise return the stored status
/// unchanged so the reconciler skips the write.
fn state_download_error(status: &DatabaseBackupStatus, now: DateTime<Utc>) -> DatabaseBackupStatus {
    if status.time + Duration::seconds(DOWNLOAD_RETRY_SECS) < now {
        return DatabaseBackupStatus::transition(BackupState::Download, false, "", now);
    }
    status.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoopBackend;
    use crate::crd::{DatabaseBackupSpec, DeploymentRef, DownloadSpec, UploadSpec};
    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    struct FailingBackend {
        error: BackendError,
    }

    #[async_trait]
    impl BackupBackend for FailingBackend {
        async fn deployment_ready(
            &self,
            _: &DatabaseBackup,
        ) -> std::result::Result<bool, BackendError> {
            Err(self.error.clone())
        }
        async fn create_snapshot(
            &self,
            _: &DatabaseBackup,
        ) -> std::result::Result<(), BackendError> {
            Err(self.error.clone())
        }
        async fn upload_snapshot(
            &self,
            _: &DatabaseBackup,
        ) -> std::result::Result<(), BackendError> {
            Err(self.error.clone())
        }
        async fn download_snapshot(
            &self,
            _: &DatabaseBackup,
        ) -> std::result::Result<(), BackendError> {
            Err(self.error.clone())
        }
    }

    fn backup(spec: DatabaseBackupSpec, status: Option<DatabaseBackupStatus>) -> DatabaseBackup {
        let mut b = DatabaseBackup::new(
            "test-backup",
            spec,
        );
        b.metadata = ObjectMeta {
            name: Some("test-backup".into()),
            namespace: Some("default".into()),
            ..Default::default()
        };
        b.status = status;
        b
    }

    fn plain_spec() -> DatabaseBackupSpec {
        DatabaseBackupSpec {
            deployment: DeploymentRef {
                name: "db".into(),
            },
            upload: None,
            download: None,
            options: None,
        }
    }

    fn upload_spec() -> DatabaseBackupSpec {
        DatabaseBackupSpec {
            upload: Some(UploadSpec {
                repository_url: "s3://backups/db".into(),
                credentials_secret: None,
            }),
            ..plain_spec()
        }
    }

    fn download_spec() -> DatabaseBackupSpec {
        DatabaseBackupSpec {
            download: Some(DownloadSpec {
                repository_url: "s3://backups/db".into(),
                id: "backup-123".into(),
                credentials_secret: None,
            }),
            ..plain_spec()
        }
    }

    fn status_at(state: BackupState, time: DateTime<Utc>) -> DatabaseBackupStatus {
        DatabaseBackupStatus::transition(state, false, "", time)
    }

    #[tokio::test]
    async fn empty_status_becomes_scheduled() {
        let now = Utc::now();
        let next = evaluate(&NoopBackend, &backup(plain_spec(), None), now)
            .await
            .unwrap();
        assert_eq!(next.state, BackupState::Scheduled);
        assert!(!next.available);
        assert_eq!(next.time, now);
    }

    #[tokio::test]
    async fn invalid_spec_fails_structurally() {
        let mut spec = plain_spec();
        spec.deployment.name = String::new();
        let now = Utc::now();
        let next = evaluate(&NoopBackend, &backup(spec, None), now).await.unwrap();
        assert_eq!(next.state, BackupState::Failed);
        assert!(next.message.contains("deployment"));
    }

    #[tokio::test]
    async fn scheduled_goes_to_create_without_download_spec() {
        let now = Utc::now();
        let b = backup(plain_spec(), Some(status_at(BackupState::Scheduled, now)));
        let next = evaluate(&NoopBackend, &b, now).await.unwrap();
        assert_eq!(next.state, BackupState::Create);
    }

    #[tokio::test]
    async fn scheduled_goes_to_download_with_download_spec() {
        let now = Utc::now();
        let b = backup(download_spec(), Some(status_at(BackupState::Scheduled, now)));
        let next = evaluate(&NoopBackend, &b, now).await.unwrap();
        assert_eq!(next.state, BackupState::Download);
    }

    #[tokio::test]
    async fn create_goes_ready_without_upload_target() {
        let now = Utc::now();
        let b = backup(plain_spec(), Some(status_at(BackupState::Create, now)));
        let next = evaluate(&NoopBackend, &b, now).await.unwrap();
        assert_eq!(next.state, BackupState::Ready);
        assert!(next.available);
        assert!(next.message.is_empty());
    }

    #[tokio::test]
    async fn create_goes_to_upload_with_upload_target() {
        let now = Utc::now();
        let b = backup(upload_spec(), Some(status_at(BackupState::Create, now)));
        let next = evaluate(&NoopBackend, &b, now).await.unwrap();
        assert_eq!(next.state, BackupState::Upload);
        assert!(!next.available);
    }

    #[tokio::test]
    async fn permanent_readiness_rejection_parks_in_failed() {
        let backend = FailingBackend {
            error: BackendError::permanent("deployment does not support snapshots"),
        };
        let now = Utc::now();
        let b = backup(plain_spec(), Some(status_at(BackupState::Scheduled, now)));
        let next = evaluate(&backend, &b, now).await.unwrap();
        assert_eq!(next.state, BackupState::Failed);
        assert!(next.message.contains("does not support snapshots"));
    }

    #[tokio::test]
    async fn transient_readiness_failure_surfaces_as_retryable_error() {
        let backend = FailingBackend {
            error: BackendError::transient("deployment unreachable"),
        };
        let now = Utc::now();
        let b = backup(plain_spec(), Some(status_at(BackupState::Scheduled, now)));
        let err = evaluate(&backend, &b, now).await.unwrap_err();
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn transient_create_failure_surfaces_as_retryable_error() {
        let backend = FailingBackend {
            error: BackendError::transient("backend busy"),
        };
        let now = Utc::now();
        let b = backup(plain_spec(), Some(status_at(BackupState::Create, now)));
        let err = evaluate(&backend, &b, now).await.unwrap_err();
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn permanent_upload_failure_moves_to_failed() {
        let backend = FailingBackend {
            error: BackendError::permanent("repository rejected credentials"),
        };
        let now = Utc::now();
        let b = backup(upload_spec(), Some(status_at(BackupState::Upload, now)));
        let next = evaluate(&backend, &b, now).await.unwrap();
        assert_eq!(next.state, BackupState::Failed);
        assert!(next.message.contains("rejected"));
    }

    #[tokio::test]
    async fn download_failure_moves_to_download_error() {
        let backend = FailingBackend {
            error: BackendError::transient("fetch interrupted"),
        };
        let now = Utc::now();
        let b = backup(download_spec(), Some(status_at(BackupState::Download, now)));
        let next = evaluate(&backend, &b, now).await.unwrap();
        assert_eq!(next.state, BackupState::DownloadError);
        assert!(!next.available);
        assert!(next.message.contains("fetch interrupted"));
    }

    #[tokio::test]
    async fn download_error_is_a_noop_before_the_delay() {
        let now = Utc::now();
        let stored = status_at(BackupState::DownloadError, now - Duration::seconds(30));
        let b = backup(download_spec(), Some(stored.clone()));
        let next = evaluate(&NoopBackend, &b, now).await.unwrap();
        assert_eq!(next, stored);
    }

    #[tokio::test]
    async fn download_error_retries_after_the_delay() {
        let now = Utc::now();
        let stored = status_at(
            BackupState::DownloadError,
            now - Duration::seconds(DOWNLOAD_RETRY_SECS + 1),
        );
        let b = backup(download_spec(), Some(stored));
        let next = evaluate(&NoopBackend, &b, now).await.unwrap();
        assert_eq!(next.state, BackupState::Download);
        assert!(!next.available);
        assert_eq!(next.time, now);
    }

    #[tokio::test]
    async fn download_error_boundary_just_before_delay_holds() {
        let now = Utc::now();
        let stored = status_at(
            BackupState::DownloadError,
            now - Duration::seconds(DOWNLOAD_RETRY_SECS),
        );
        let b = backup(download_spec(), Some(stored.clone()));
        // Delay has not *fully* elapsed at exactly the boundary.
        let next = evaluate(&NoopBackend, &b, now).await.unwrap();
        assert_eq!(next, stored);
    }

    #[tokio::test]
    async fn terminal_states_do_not_transition() {
        let now = Utc::now();
        for state in [BackupState::Ready, BackupState::Failed, BackupState::Deleted] {
            let stored = DatabaseBackupStatus::transition(
                state,
                state == BackupState::Ready,
                "",
                now - Duration::hours(1),
            );
            let b = backup(plain_spec(), Some(stored.clone()));
            let next = evaluate(&NoopBackend, &b, now).await.unwrap();
            assert_eq!(next, stored);
        }
    }
}
