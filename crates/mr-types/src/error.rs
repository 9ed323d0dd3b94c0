use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown container: {0}")]
    UnknownContainer(String),

    #[error("empty SHA token")]
    EmptySha,

    #[error("serialization error: {0}")]
    Serialization(String),
}
