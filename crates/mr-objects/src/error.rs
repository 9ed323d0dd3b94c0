use mr_container::ContainerError;
use mr_types::ContainerName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("no {container} object matches {query}")]
    NotFound {
        container: ContainerName,
        query: String,
    },

    #[error("{field} is not an updatable {container} field")]
    FieldNotWhitelisted {
        container: ContainerName,
        field: String,
    },

    /// The primary delete was written but some linked records were not.
    #[error("deleted {deleted} but could not clean up linked objects: {}", .failed.join(", "))]
    OrphanRisk { deleted: String, failed: Vec<String> },

    #[error("{0} objects need a non-empty name")]
    EmptyName(ContainerName),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl RepositoryError {
    pub fn status_code(&self) -> u16 {
        match self {
            RepositoryError::NotFound { .. } => 404,
            RepositoryError::FieldNotWhitelisted { .. }
            | RepositoryError::EmptyName(_)
            | RepositoryError::InvalidValue(_) => 400,
            RepositoryError::OrphanRisk { .. } => 207,
            RepositoryError::Serialization(_) => 500,
            RepositoryError::Container(e) => e.status_code(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
