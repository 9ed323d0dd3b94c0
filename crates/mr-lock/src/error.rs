//! Error types for lock operations.

use mr_store::StoreError;
use mr_types::ContainerName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    /// Another writer holds a live lock on the container.
    #[error("{container} is locked by {holder}")]
    Contention {
        container: ContainerName,
        holder: String,
    },

    /// The lock file no longer carries the SHA recorded at lock time.
    ///
    /// Our lock was overridden as stale and someone else now holds the
    /// container; the foreign lock file is left in place.
    #[error("lock on {container} was lost: {path} now belongs to another holder")]
    LockLost {
        container: ContainerName,
        path: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type LockResult<T> = Result<T, LockError>;
