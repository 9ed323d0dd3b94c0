use std::sync::Arc;

use mr_store::{ObjectBackend, StoreError};
use mr_types::{ContainerName, Sha};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catcher::Catcher;
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{read_snapshot, RepoMetadata};

/// How many times [`Writer::apply`] runs merge-then-write before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Writes container arrays back with compare-and-swap on the prior SHA.
pub struct Writer {
    backend: Arc<dyn ObjectBackend>,
    branch: String,
    retry: RetryPolicy,
}

impl Writer {
    pub fn new(backend: Arc<dyn ObjectBackend>, branch: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            branch: branch.into(),
            retry,
        }
    }

    /// A writer on the same backend and branch as `catcher`.
    pub fn for_catcher(catcher: &Catcher, retry: RetryPolicy) -> Self {
        Self::new(catcher.backend().clone(), catcher.branch(), retry)
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Replace the container's data file with `objects` in one CAS write.
    ///
    /// `prior` is the SHA the objects were read at, or `None` if the file
    /// did not exist. Returns the new content SHA.
    pub async fn write_object(
        &self,
        container: ContainerName,
        objects: &[Value],
        prior: Option<&Sha>,
        message: &str,
    ) -> ContainerResult<Sha> {
        let path = container.data_path();
        let body = serde_json::to_vec_pretty(objects)
            .map_err(|e| ContainerError::Serialization(e.to_string()))?;

        match self
            .backend
            .write_file(&self.branch, &path, &body, prior, message)
            .await
        {
            Ok(receipt) => {
                debug!(%container, sha = %receipt.content_sha, objects = objects.len(), "container written");
                Ok(receipt.content_sha)
            }
            Err(StoreError::Conflict { .. }) | Err(StoreError::AlreadyExists(_)) => {
                Err(ContainerError::WriteConflict {
                    container,
                    attempts: 1,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Merge into the caught objects and write, retrying on conflict.
    ///
    /// On a conflict the container is re-read and `merge` is applied again
    /// to the fresh objects. On success the snapshot in `meta` holds the
    /// merged objects and the new SHA.
    pub async fn apply<F, E>(
        &self,
        meta: &mut RepoMetadata,
        container: ContainerName,
        message: &str,
        mut merge: F,
    ) -> Result<Sha, E>
    where
        F: FnMut(Vec<Value>) -> Result<Vec<Value>, E>,
        E: From<ContainerError>,
    {
        if !meta.is_held(container) {
            return Err(ContainerError::NotLocked(container).into());
        }
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let snapshot = meta
                .containers
                .entry(container)
                .or_default();
            let merged = merge(snapshot.objects.clone())?;

            match self
                .write_object(container, &merged, snapshot.sha.as_ref(), message)
                .await
            {
                Ok(sha) => {
                    snapshot.objects = merged;
                    snapshot.sha = Some(sha.clone());
                    info!(%container, attempt, "container updated");
                    return Ok(sha);
                }
                Err(ContainerError::WriteConflict { .. }) if attempt < max_attempts => {
                    warn!(%container, attempt, "write conflict, re-reading container");
                    let fresh = read_snapshot(self.backend.as_ref(), &self.branch, container).await?;
                    meta.containers.insert(container, fresh);
                }
                Err(ContainerError::WriteConflict { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ContainerError::WriteConflict {
            container,
            attempts: max_attempts,
        }
        .into())
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("backend", &self.backend.describe())
            .field("branch", &self.branch)
            .field("retry", &self.retry)
            .finish()
    }
}
