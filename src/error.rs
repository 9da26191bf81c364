//! Error types for the Database Backup Operator

use thiserror::Error;

use crate::backend::BackendError;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Snapshot backend error
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Registration error (informer/starter/handler wiring)
    #[error("Registration error: {0}")]
    Registration(String),

    /// Resource not found in the store
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a registration error
    pub fn registration(msg: impl Into<String>) -> Self {
        Error::Registration(msg.into())
    }

    /// Whether the failed operation should be re-enqueued with backoff.
    /// Store and transport errors are assumed recoverable by re-read;
    /// validation and wiring defects are not.
    pub fn retryable(&self) -> bool {
        match self {
            Error::Kube(_) | Error::Io(_) => true,
            Error::Backend(BackendError::Transient(_)) => true,
            Error::Backend(BackendError::Permanent(_)) => false,
            Error::Validation(_) | Error::Registration(_) => false,
            Error::NotFound(_) => true,
            Error::Serialization(_) => false,
        }
    }
}
