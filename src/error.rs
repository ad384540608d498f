//! Error types for the botdata library
//!
//! Every store operation returns [`StorageResult`]. Precondition failures and
//! conflicts are kept apart from transport failures so callers can decide
//! between reload-and-retry and giving up.

use crate::types::EntityKey;
use thiserror::Error;

/// Storage-related errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// Conditional save whose eTag no longer matches the stored version
    #[error("Precondition failed: eTag does not match current version of {key}")]
    PreconditionFailed { key: EntityKey },

    /// Create-only save for a record that already exists
    #[error("Record already exists: {key}")]
    Conflict { key: EntityKey },

    /// The backend call itself failed
    #[error("Storage backend {backend} failed: {message}")]
    Transport {
        backend: &'static str,
        message: String,
    },

    /// Table or database the relational backend needs is absent
    #[error("Storage schema missing: {0}")]
    SchemaMissing(String),

    /// Address lacks an id required by the store type
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Payload could not be encoded or decoded
    #[error("Storage serialization failed: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Build a transport error for `backend`
    pub fn transport(backend: &'static str, err: impl std::fmt::Display) -> Self {
        StorageError::Transport {
            backend,
            message: err.to_string(),
        }
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StorageError::PreconditionFailed { .. })
    }

    /// True for errors a caller can resolve by reloading and retrying
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::PreconditionFailed { .. } | StorageError::Conflict { .. }
        )
    }

    /// HTTP status code equivalent of this error
    pub fn status_code(&self) -> u16 {
        match self {
            StorageError::PreconditionFailed { .. } => 412,
            StorageError::Conflict { .. } => 409,
            StorageError::InvalidAddress(_) => 400,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite-storage")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::transport("sql", err)
    }
}

#[cfg(feature = "redis-storage")]
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::transport("redis", err)
    }
}

/// Type alias for Storage Result
pub type StorageResult<T> = std::result::Result<T, StorageError>;
