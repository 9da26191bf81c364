//! Database Backup Kubernetes Operator
//!
//! Watches DatabaseBackup custom resources and drives each one through its
//! backup lifecycle (create, upload, download, ready) via a generic
//! operator runtime with a deduplicating work queue.

pub mod backend;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod operator;
pub mod reconcilers;
pub mod store;
pub mod watch;

pub use error::{Error, Result};
