use mr_lock::LockError;
use mr_store::StoreError;
use mr_types::ContainerName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("{container} is locked by {holder}")]
    LockContention {
        container: ContainerName,
        holder: String,
    },

    #[error("{container} changed underneath us ({attempts} attempt(s))")]
    WriteConflict {
        container: ContainerName,
        attempts: u32,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A later container could not be locked; the earlier ones were released.
    #[error("could not lock {failed}: {reason} (rolled back {})", list(.rolled_back))]
    PartialLockFailure {
        failed: ContainerName,
        reason: String,
        rolled_back: Vec<ContainerName>,
    },

    #[error("failed to release {}", describe_failures(.failures))]
    ReleaseFailed {
        failures: Vec<(ContainerName, String)>,
    },

    #[error("lock on {0} was lost to another holder")]
    LockLost(ContainerName),

    /// A write was attempted on a container the session did not catch.
    #[error("{0} is not held by this session")]
    NotLocked(ContainerName),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl ContainerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ContainerError::LockContention { .. } | ContainerError::PartialLockFailure { .. } => 423,
            ContainerError::WriteConflict { .. } | ContainerError::LockLost(_) => 409,
            ContainerError::NotFound(_) => 404,
            ContainerError::PermissionDenied(_) => 403,
            ContainerError::NotLocked(_) => 428,
            ContainerError::ReleaseFailed { .. } | ContainerError::Serialization(_) => 500,
            ContainerError::Store(e) => e.status_code(),
        }
    }
}

impl From<StoreError> for ContainerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ContainerError::NotFound(what),
            StoreError::PermissionDenied(m) | StoreError::Unauthorized(m) => {
                ContainerError::PermissionDenied(m)
            }
            StoreError::Serialization(m) => ContainerError::Serialization(m),
            other => ContainerError::Store(other),
        }
    }
}

impl From<LockError> for ContainerError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Contention { container, holder } => {
                ContainerError::LockContention { container, holder }
            }
            LockError::LockLost { container, .. } => ContainerError::LockLost(container),
            LockError::Serialization(m) => ContainerError::Serialization(m),
            LockError::Store(e) => e.into(),
        }
    }
}

fn list(names: &[ContainerName]) -> String {
    if names.is_empty() {
        return "nothing".to_string();
    }
    names.iter().map(ContainerName::as_str).collect::<Vec<_>>().join(", ")
}

fn describe_failures(failures: &[(ContainerName, String)]) -> String {
    failures
        .iter()
        .map(|(name, message)| format!("{name}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type ContainerResult<T> = Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let contention = ContainerError::LockContention {
            container: ContainerName::Companies,
            holder: "mr_cli".into(),
        };
        assert_eq!(contention.status_code(), 423);
        let conflict = ContainerError::WriteConflict {
            container: ContainerName::Companies,
            attempts: 3,
        };
        assert_eq!(conflict.status_code(), 409);
        assert_eq!(
            ContainerError::ReleaseFailed { failures: vec![] }.status_code(),
            500
        );
    }

    #[test]
    fn store_errors_keep_their_kind() {
        assert!(matches!(
            ContainerError::from(StoreError::Unauthorized("bad token".into())),
            ContainerError::PermissionDenied(_)
        ));
        assert!(matches!(
            ContainerError::from(StoreError::NotFound("Companies/Companies.json".into())),
            ContainerError::NotFound(_)
        ));
        let transport = ContainerError::from(StoreError::Transport("reset".into()));
        assert_eq!(transport.status_code(), 503);
    }

    #[test]
    fn messages_list_containers() {
        let partial = ContainerError::PartialLockFailure {
            failed: ContainerName::Interactions,
            reason: "locked".into(),
            rolled_back: vec![ContainerName::Companies],
        };
        assert_eq!(
            partial.to_string(),
            "could not lock Interactions: locked (rolled back Companies)"
        );
        let release = ContainerError::ReleaseFailed {
            failures: vec![(ContainerName::Studies, "timeout".into())],
        };
        assert_eq!(release.to_string(), "failed to release Studies: timeout");
    }
}
