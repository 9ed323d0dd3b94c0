use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use mr_lock::{ContainerLock, LockConfig, LockManager, UnlockOutcome};
use mr_store::ObjectBackend;
use mr_types::{BranchRef, Clock, ContainerName};
use tracing::{debug, warn};

use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{read_snapshot, ContainerSnapshot, RepoMetadata};

/// What [`Catcher::release`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: Vec<ContainerName>,
    pub already_released: Vec<ContainerName>,
}

/// Locks containers, reads them, and releases them again.
pub struct Catcher {
    backend: Arc<dyn ObjectBackend>,
    locks: LockManager,
}

impl Catcher {
    pub fn new(backend: Arc<dyn ObjectBackend>, config: LockConfig) -> Self {
        let locks = LockManager::new(backend.clone(), config);
        Self { backend, locks }
    }

    pub fn with_clock(
        backend: Arc<dyn ObjectBackend>,
        config: LockConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = LockManager::with_clock(backend.clone(), config, clock);
        Self { backend, locks }
    }

    pub fn backend(&self) -> &Arc<dyn ObjectBackend> {
        &self.backend
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn branch(&self) -> &str {
        &self.locks.config().branch
    }

    /// Lock and read every container named in `meta`.
    ///
    /// All-or-nothing: if any lock or read fails, every lock taken here is
    /// released before the error is returned.
    pub async fn catch(&self, mut meta: RepoMetadata) -> ContainerResult<RepoMetadata> {
        let requested = meta.requested();
        if requested.is_empty() {
            return Ok(meta);
        }

        let mut acquired: Vec<ContainerLock> = Vec::with_capacity(requested.len());
        for &name in &requested {
            match self.locks.lock_container(name).await {
                Ok(lock) => acquired.push(lock),
                Err(e) => {
                    if acquired.is_empty() {
                        return Err(e.into());
                    }
                    let rolled_back = self.rollback(acquired).await;
                    return Err(ContainerError::PartialLockFailure {
                        failed: name,
                        reason: e.to_string(),
                        rolled_back,
                    });
                }
            }
        }

        match self.read_all(&requested).await {
            Ok((snapshots, branch)) => {
                meta.containers = snapshots;
                meta.branch = Some(branch);
                meta.locks = acquired.into_iter().map(|l| (l.container, l)).collect();
                debug!(containers = ?requested, "caught containers");
                Ok(meta)
            }
            Err(e) => {
                self.rollback(acquired).await;
                Err(e)
            }
        }
    }

    async fn read_all(
        &self,
        names: &[ContainerName],
    ) -> ContainerResult<(BTreeMap<ContainerName, ContainerSnapshot>, BranchRef)> {
        let mut snapshots = BTreeMap::new();
        for &name in names {
            snapshots.insert(name, self.read_container(name).await?);
        }
        let branch = self.backend.branch_head(self.branch()).await?;
        Ok((snapshots, branch))
    }

    async fn rollback(&self, acquired: Vec<ContainerLock>) -> Vec<ContainerName> {
        let mut rolled_back = Vec::with_capacity(acquired.len());
        for lock in acquired {
            match self.locks.unlock_container(&lock).await {
                Ok(_) => rolled_back.push(lock.container),
                Err(e) => warn!(container = %lock.container, error = %e, "rollback unlock failed"),
            }
        }
        warn!(containers = ?rolled_back, "rolled back partial catch");
        rolled_back
    }

    /// Read a container without locking it.
    pub async fn read_container(&self, name: ContainerName) -> ContainerResult<ContainerSnapshot> {
        read_snapshot(self.backend.as_ref(), self.branch(), name).await
    }

    /// Re-read one container into `meta`, e.g. after a write conflict.
    pub async fn refresh(&self, meta: &mut RepoMetadata, name: ContainerName) -> ContainerResult<()> {
        let snapshot = self.read_container(name).await?;
        meta.containers.insert(name, snapshot);
        Ok(())
    }

    /// Unlock every container held by `meta`.
    ///
    /// Every lock is attempted even if an earlier one fails; failures are
    /// collected into [`ContainerError::ReleaseFailed`].
    pub async fn release(&self, meta: RepoMetadata) -> ContainerResult<ReleaseReport> {
        let mut report = ReleaseReport::default();
        let mut failures = Vec::new();
        for (name, lock) in meta.locks {
            match self.locks.unlock_container(&lock).await {
                Ok(UnlockOutcome::Released) => report.released.push(name),
                Ok(UnlockOutcome::AlreadyReleased) => report.already_released.push(name),
                Err(e) => {
                    warn!(container = %name, error = %e, "failed to release container");
                    failures.push((name, e.to_string()));
                }
            }
        }
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(ContainerError::ReleaseFailed { failures })
        }
    }

    /// Release `meta` and combine the result with the session's outcome.
    ///
    /// A work error takes precedence over a release error, which is then
    /// only logged.
    pub async fn finish<T, E>(&self, meta: RepoMetadata, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<ContainerError> + Display,
    {
        let released = self.release(meta).await;
        match (outcome, released) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(release)) => Err(release.into()),
            (Err(work), Ok(_)) => Err(work),
            (Err(work), Err(release)) => {
                warn!(error = %work, release = %release, "release failed after work error");
                Err(work)
            }
        }
    }
}

impl std::fmt::Debug for Catcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catcher")
            .field("backend", &self.backend.describe())
            .field("locks", &self.locks)
            .finish()
    }
}
