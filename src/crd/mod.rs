//! Custom Resource Definitions for the Database Backup Operator

mod database_backup;

pub use database_backup::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Vec<String> {
    vec![serde_yaml::to_string(&DatabaseBackup::crd()).unwrap()]
}
