use std::sync::Arc;

use chrono::Duration;
use mr_store::{ObjectBackend, StoreError};
use mr_types::{Clock, ContainerName, Sha, SystemClock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LockError, LockResult};
use crate::record::LockRecord;

const LOCK_SUFFIX: &str = ".lock";

/// Lock manager settings.
#[derive(Clone, Debug)]
pub struct LockConfig {
    /// Branch the lock files are written to.
    pub branch: String,
    /// Shared lock file stem; cooperating writers must agree on it.
    pub process_name: String,
    /// Locks older than this may be overridden. `None` never expires a lock.
    pub stale_after: Option<Duration>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            process_name: "mr_cli".to_string(),
            stale_after: Some(Duration::minutes(10)),
        }
    }
}

/// A lock this process holds.
///
/// `sha` is the content SHA of the lock file as we created it; release is
/// conditioned on it so a lock taken over by someone else is never removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerLock {
    pub container: ContainerName,
    pub path: String,
    pub sha: Sha,
    pub record: LockRecord,
}

/// One lock file found in a container directory.
#[derive(Clone, Debug)]
pub struct LockHolder {
    pub path: String,
    pub sha: Sha,
    /// `None` for empty or unparsable lock files.
    pub record: Option<LockRecord>,
    pub stale: bool,
}

impl LockHolder {
    pub fn describe(&self) -> String {
        match &self.record {
            Some(record) => record.describe(),
            None => format!("unknown holder ({})", self.path),
        }
    }
}

/// Result of [`LockManager::check_for_lock`].
#[derive(Clone, Debug)]
pub struct LockStatus {
    pub container: ContainerName,
    pub holders: Vec<LockHolder>,
}

impl LockStatus {
    /// Whether any non-stale lock file exists.
    pub fn is_locked(&self) -> bool {
        self.holders.iter().any(|h| !h.stale)
    }

    /// The first live holder, if any.
    pub fn live_holder(&self) -> Option<&LockHolder> {
        self.holders.iter().find(|h| !h.stale)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlockOutcome {
    Released,
    /// The lock file was already gone.
    AlreadyReleased,
}

/// Acquires and releases container locks against an [`ObjectBackend`].
pub struct LockManager {
    backend: Arc<dyn ObjectBackend>,
    config: LockConfig,
    owner: Uuid,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(backend: Arc<dyn ObjectBackend>, config: LockConfig) -> Self {
        Self::with_clock(backend, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<dyn ObjectBackend>,
        config: LockConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            config,
            owner: Uuid::new_v4(),
            clock,
        }
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Inspect every `*.lock` file under the container directory.
    pub async fn check_for_lock(&self, container: ContainerName) -> LockResult<LockStatus> {
        let branch = &self.config.branch;
        let entries = self.backend.list_dir(branch, container.directory()).await?;
        let now = self.clock.now();

        let mut holders = Vec::new();
        for entry in entries.into_iter().filter(|e| e.name.ends_with(LOCK_SUFFIX)) {
            // Released between listing and reading.
            let Some(blob) = self.backend.read_file(branch, &entry.path).await? else {
                continue;
            };
            let record = LockRecord::parse(&blob.content);
            let stale = match (&record, self.config.stale_after) {
                (Some(record), Some(threshold)) => record.is_stale(now, threshold),
                _ => false,
            };
            holders.push(LockHolder {
                path: entry.path,
                sha: blob.sha,
                record,
                stale,
            });
        }

        debug!(%container, holders = holders.len(), "checked container locks");
        Ok(LockStatus { container, holders })
    }

    /// Take the container lock.
    ///
    /// Fails with [`LockError::Contention`] if a live lock exists. A stale
    /// lock at our path is deleted (conditioned on its SHA) before the
    /// create; losing either race is reported as contention.
    pub async fn lock_container(&self, container: ContainerName) -> LockResult<ContainerLock> {
        let status = self.check_for_lock(container).await?;
        if let Some(holder) = status.live_holder() {
            return Err(LockError::Contention {
                container,
                holder: holder.describe(),
            });
        }

        let path = container.lock_path(&self.config.process_name);
        if let Some(stale) = status.holders.iter().find(|h| h.path == path) {
            self.remove_stale(container, stale).await?;
        }

        let record = LockRecord::new(self.owner, &self.config.process_name, self.clock.now());
        let body =
            serde_json::to_vec_pretty(&record).map_err(|e| LockError::Serialization(e.to_string()))?;
        let message = format!("Lock {container} for {}", self.config.process_name);

        match self
            .backend
            .write_file(&self.config.branch, &path, &body, None, &message)
            .await
        {
            Ok(receipt) => {
                info!(%container, %path, owner = %self.owner, "container locked");
                Ok(ContainerLock {
                    container,
                    path,
                    sha: receipt.content_sha,
                    record,
                })
            }
            Err(StoreError::AlreadyExists(_)) | Err(StoreError::Conflict { .. }) => {
                Err(LockError::Contention {
                    container,
                    holder: "a concurrent locker".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_stale(&self, container: ContainerName, stale: &LockHolder) -> LockResult<()> {
        warn!(
            %container,
            path = %stale.path,
            holder = %stale.describe(),
            "recovering stale container lock"
        );
        let message = format!("Remove stale lock on {container}");
        match self
            .backend
            .delete_file(&self.config.branch, &stale.path, &stale.sha, &message)
            .await
        {
            Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(StoreError::Conflict { .. }) => Err(LockError::Contention {
                container,
                holder: "a concurrent locker".to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Release a lock taken by [`lock_container`](Self::lock_container).
    ///
    /// Releasing twice is harmless. If the lock file was replaced by another
    /// holder it is left alone and [`LockError::LockLost`] is returned.
    pub async fn unlock_container(&self, lock: &ContainerLock) -> LockResult<UnlockOutcome> {
        let message = format!("Unlock {} for {}", lock.container, self.config.process_name);
        match self
            .backend
            .delete_file(&self.config.branch, &lock.path, &lock.sha, &message)
            .await
        {
            Ok(()) => {
                info!(container = %lock.container, path = %lock.path, "container unlocked");
                Ok(UnlockOutcome::Released)
            }
            Err(StoreError::NotFound(_)) => {
                debug!(container = %lock.container, "lock already released");
                Ok(UnlockOutcome::AlreadyReleased)
            }
            Err(StoreError::Conflict { .. }) => Err(LockError::LockLost {
                container: lock.container,
                path: lock.path.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every lock file on the container regardless of owner or age.
    ///
    /// Returns the number of files removed. This is the only way to clear a
    /// legacy lock file that carries no record.
    pub async fn force_unlock(&self, container: ContainerName) -> LockResult<usize> {
        let status = self.check_for_lock(container).await?;
        let mut removed = 0;
        for holder in &status.holders {
            warn!(%container, path = %holder.path, holder = %holder.describe(), "force-clearing lock");
            let message = format!("Clear lock on {container}");
            match self
                .backend
                .delete_file(&self.config.branch, &holder.path, &holder.sha, &message)
                .await
            {
                Ok(()) => removed += 1,
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("backend", &self.backend.describe())
            .field("config", &self.config)
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use mr_store::{DirEntry, FileBlob, InMemoryBackend, StoreResult, WriteReceipt};
    use mr_types::{BranchRef, ManualClock};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn manager(backend: &Arc<InMemoryBackend>, clock: &Arc<ManualClock>) -> LockManager {
        LockManager::with_clock(backend.clone(), LockConfig::default(), clock.clone())
    }

    #[tokio::test]
    async fn lock_then_unlock() {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = clock();
        let locks = manager(&backend, &clock);

        let lock = locks.lock_container(ContainerName::Companies).await.unwrap();
        assert_eq!(lock.path, "Companies/mr_cli.lock");
        assert_eq!(lock.record.owner, locks.owner());
        assert!(locks.check_for_lock(ContainerName::Companies).await.unwrap().is_locked());
        assert!(!locks.check_for_lock(ContainerName::Studies).await.unwrap().is_locked());

        assert_eq!(locks.unlock_container(&lock).await.unwrap(), UnlockOutcome::Released);
        assert!(backend.paths("main").is_empty());
    }

    #[tokio::test]
    async fn second_locker_sees_contention() {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = clock();
        let first = manager(&backend, &clock);
        let second = manager(&backend, &clock);

        first.lock_container(ContainerName::Interactions).await.unwrap();
        let err = second.lock_container(ContainerName::Interactions).await.unwrap_err();
        match err {
            LockError::Contention { container, holder } => {
                assert_eq!(container, ContainerName::Interactions);
                assert!(holder.starts_with("mr_cli"));
            }
            other => panic!("expected contention, got {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_lockers_have_one_winner() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let locks = LockManager::new(backend.clone(), LockConfig::default());
            set.spawn(async move { locks.lock_container(ContainerName::Companies).await });
        }

        let mut winners = 0;
        while let Some(result) = set.join_next().await {
            match result.unwrap() {
                Ok(_) => winners += 1,
                Err(LockError::Contention { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn stale_lock_is_recovered() {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = clock();
        let crashed = manager(&backend, &clock);
        let next = manager(&backend, &clock);

        let abandoned = crashed.lock_container(ContainerName::Studies).await.unwrap();

        clock.advance(Duration::minutes(5));
        assert!(next.lock_container(ContainerName::Studies).await.is_err());

        clock.advance(Duration::minutes(6));
        let status = next.check_for_lock(ContainerName::Studies).await.unwrap();
        assert!(!status.is_locked());
        assert!(status.holders[0].stale);

        let lock = next.lock_container(ContainerName::Studies).await.unwrap();
        assert_eq!(lock.record.owner, next.owner());

        // The crashed process must not remove the new holder's lock.
        assert!(matches!(
            crashed.unlock_container(&abandoned).await,
            Err(LockError::LockLost { .. })
        ));
        assert!(next.check_for_lock(ContainerName::Studies).await.unwrap().is_locked());
    }

    #[tokio::test]
    async fn disabled_threshold_never_expires() {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = clock();
        let config = LockConfig {
            stale_after: None,
            ..LockConfig::default()
        };
        let first = LockManager::with_clock(backend.clone(), config.clone(), clock.clone());
        let second = LockManager::with_clock(backend.clone(), config, clock.clone());

        first.lock_container(ContainerName::Companies).await.unwrap();
        clock.advance(Duration::days(30));
        assert!(matches!(
            second.lock_container(ContainerName::Companies).await,
            Err(LockError::Contention { .. })
        ));
    }

    #[tokio::test]
    async fn unlock_is_idempotent() {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = clock();
        let locks = manager(&backend, &clock);

        let lock = locks.lock_container(ContainerName::Companies).await.unwrap();
        assert_eq!(locks.unlock_container(&lock).await.unwrap(), UnlockOutcome::Released);
        assert_eq!(
            locks.unlock_container(&lock).await.unwrap(),
            UnlockOutcome::AlreadyReleased
        );
    }

    #[tokio::test]
    async fn legacy_empty_lock_is_honored_until_forced() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed("main", "Companies/mr_cli.lock", b"", Sha::new("e69de29").unwrap());
        let clock = clock();
        let locks = manager(&backend, &clock);

        clock.advance(Duration::days(365));
        let err = locks.lock_container(ContainerName::Companies).await.unwrap_err();
        assert!(matches!(err, LockError::Contention { ref holder, .. } if holder.contains("unknown holder")));

        assert_eq!(locks.force_unlock(ContainerName::Companies).await.unwrap(), 1);
        locks.lock_container(ContainerName::Companies).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_lock_files_count() {
        let backend = Arc::new(InMemoryBackend::new());
        let clock = clock();
        let record = LockRecord::new(Uuid::new_v4(), "web_ui", clock.now());
        let body = serde_json::to_vec(&record).unwrap();
        backend.seed("main", "Interactions/web_ui.lock", &body, Sha::new("f00d").unwrap());
        backend.seed("main", "Interactions/Interactions.json", b"[]", Sha::new("abc").unwrap());

        let locks = manager(&backend, &clock);
        let status = locks.check_for_lock(ContainerName::Interactions).await.unwrap();
        assert_eq!(status.holders.len(), 1);
        assert!(matches!(
            locks.lock_container(ContainerName::Interactions).await,
            Err(LockError::Contention { ref holder, .. }) if holder.starts_with("web_ui")
        ));
    }

    /// Rejects every delete with a transport error.
    struct NoDeletes(InMemoryBackend);

    #[async_trait]
    impl ObjectBackend for NoDeletes {
        fn describe(&self) -> String {
            "no-deletes".into()
        }
        async fn branch_head(&self, branch: &str) -> StoreResult<BranchRef> {
            self.0.branch_head(branch).await
        }
        async fn read_file(&self, branch: &str, path: &str) -> StoreResult<Option<FileBlob>> {
            self.0.read_file(branch, path).await
        }
        async fn write_file(
            &self,
            branch: &str,
            path: &str,
            content: &[u8],
            expected: Option<&Sha>,
            message: &str,
        ) -> StoreResult<WriteReceipt> {
            self.0.write_file(branch, path, content, expected, message).await
        }
        async fn delete_file(&self, _: &str, _: &str, _: &Sha, _: &str) -> StoreResult<()> {
            Err(StoreError::Transport("connection reset".into()))
        }
        async fn list_dir(&self, branch: &str, dir: &str) -> StoreResult<Vec<DirEntry>> {
            self.0.list_dir(branch, dir).await
        }
    }

    #[tokio::test]
    async fn unlock_surfaces_transport_errors() {
        let locks = LockManager::new(Arc::new(NoDeletes(InMemoryBackend::new())), LockConfig::default());
        let lock = locks.lock_container(ContainerName::Companies).await.unwrap();
        assert!(matches!(
            locks.unlock_container(&lock).await,
            Err(LockError::Store(StoreError::Transport(_)))
        ));
    }
}
