/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The file (or branch) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The supplied SHA no longer matches the stored file.
    #[error("conflict on {path}: expected {expected}, store has {actual}")]
    Conflict {
        path: String,
        expected: String,
        actual: String,
    },

    /// A create-if-absent write found an existing file.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The credentials are valid but lack access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Missing or rejected credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network or protocol failure talking to a remote store.
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from a local backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend response.
    #[error("backend error {status}: {message}")]
    Backend { status: u16, message: String },
}

impl StoreError {
    /// HTTP-style status code used when rendering failures.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::NotFound(_) => 404,
            StoreError::Conflict { .. } => 409,
            StoreError::AlreadyExists(_) => 422,
            StoreError::PermissionDenied(_) => 403,
            StoreError::Unauthorized(_) => 401,
            StoreError::Transport(_) => 503,
            StoreError::Serialization(_) | StoreError::Io(_) => 500,
            StoreError::Backend { status, .. } => *status,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
