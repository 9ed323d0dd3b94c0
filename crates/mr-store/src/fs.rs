//! Local directory backend.
//!
//! [`FsBackend`] maps repository paths onto a directory tree and exposes a
//! single branch. Content SHAs are BLAKE3 digests. Creates go through a temp
//! file plus `persist_noclobber`, so create-if-absent is atomic across
//! processes on the same filesystem. Overwrites check the SHA and then
//! rename a temp file into place; the check and the rename are not one
//! atomic step, so concurrent writers must hold the container lock.

use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mr_types::{BranchRef, Sha};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectBackend;
use crate::types::{content_sha, DirEntry, FileBlob, WriteReceipt};

const TEMP_PREFIX: &str = ".mrcli-";

pub struct FsBackend {
    root: PathBuf,
    branch: String,
}

impl FsBackend {
    /// Open (creating if needed) a store rooted at `root` with branch `main`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with_branch(root, "main")
    }

    pub fn open_with_branch(root: impl Into<PathBuf>, branch: &str) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            branch: branch.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_branch(&self, branch: &str) -> StoreResult<()> {
        if branch == self.branch {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("branch {branch}")))
        }
    }

    /// Map a repository path to the filesystem, refusing escapes.
    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(path);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !clean || path.is_empty() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn read_current(&self, target: &Path) -> StoreResult<Option<FileBlob>> {
        match std::fs::read(target) {
            Ok(content) => {
                let sha = content_sha(&content);
                Ok(Some(FileBlob { content, sha }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// BLAKE3 digest over every (path, content SHA) pair, in path order.
    fn tree_digest(&self) -> StoreResult<Sha> {
        let mut hasher = blake3::Hasher::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with(TEMP_PREFIX));
        for entry in walker {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            let content = std::fs::read(entry.path())?;
            hasher.update(relative.as_bytes());
            hasher.update(b":");
            hasher.update(content_sha(&content).as_str().as_bytes());
            hasher.update(b"\n");
        }
        Ok(Sha::from_digest(hasher.finalize().as_bytes()))
    }
}

impl std::fmt::Debug for FsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBackend")
            .field("root", &self.root)
            .field("branch", &self.branch)
            .finish()
    }
}

#[async_trait]
impl ObjectBackend for FsBackend {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    async fn branch_head(&self, branch: &str) -> StoreResult<BranchRef> {
        self.check_branch(branch)?;
        Ok(BranchRef {
            name: branch.to_string(),
            sha: self.tree_digest()?,
        })
    }

    async fn read_file(&self, branch: &str, path: &str) -> StoreResult<Option<FileBlob>> {
        self.check_branch(branch)?;
        let target = self.resolve(path)?;
        self.read_current(&target)
    }

    async fn write_file(
        &self,
        branch: &str,
        path: &str,
        content: &[u8],
        expected: Option<&Sha>,
        message: &str,
    ) -> StoreResult<WriteReceipt> {
        self.check_branch(branch)?;
        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&parent)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;

        match expected {
            None => {
                tmp.persist_noclobber(&target).map_err(|e| {
                    if e.error.kind() == ErrorKind::AlreadyExists {
                        StoreError::AlreadyExists(path.to_string())
                    } else {
                        StoreError::Io(e.error)
                    }
                })?;
            }
            Some(expected) => {
                let current = self
                    .read_current(&target)?
                    .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                if current.sha != *expected {
                    return Err(StoreError::Conflict {
                        path: path.to_string(),
                        expected: expected.to_string(),
                        actual: current.sha.to_string(),
                    });
                }
                tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
            }
        }

        debug!(path, message, "local write");
        Ok(WriteReceipt {
            content_sha: content_sha(content),
            commit_sha: self.tree_digest()?,
        })
    }

    async fn delete_file(
        &self,
        branch: &str,
        path: &str,
        sha: &Sha,
        message: &str,
    ) -> StoreResult<()> {
        self.check_branch(branch)?;
        let target = self.resolve(path)?;
        let current = self
            .read_current(&target)?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if current.sha != *sha {
            return Err(StoreError::Conflict {
                path: path.to_string(),
                expected: sha.to_string(),
                actual: current.sha.to_string(),
            });
        }
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_string()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        }
        debug!(path, message, "local delete");
        Ok(())
    }

    async fn list_dir(&self, branch: &str, dir: &str) -> StoreResult<Vec<DirEntry>> {
        self.check_branch(branch)?;
        let dir = dir.trim_end_matches('/');
        let target = self.resolve(dir)?;
        let reader = match std::fs::read_dir(&target) {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut entries = Vec::new();
        for entry in reader {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let content = std::fs::read(entry.path())?;
            entries.push(DirEntry {
                path: format!("{dir}/{name}"),
                name,
                sha: content_sha(&content),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = "main";

    fn backend() -> (tempfile::TempDir, FsBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn create_read_overwrite() {
        let (_dir, store) = backend();
        let first = store
            .write_file(MAIN, "Companies/Companies.json", b"[]", None, "init")
            .await
            .unwrap();
        let second = store
            .write_file(
                MAIN,
                "Companies/Companies.json",
                b"[{\"name\":\"Acme\"}]",
                Some(&first.content_sha),
                "add",
            )
            .await
            .unwrap();
        assert_ne!(first.content_sha, second.content_sha);

        let blob = store
            .read_file(MAIN, "Companies/Companies.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blob.sha, second.content_sha);
    }

    #[tokio::test]
    async fn create_is_noclobber() {
        let (_dir, store) = backend();
        store.write_file(MAIN, "Studies/mr_cli.lock", b"a", None, "lock").await.unwrap();
        let err = store
            .write_file(MAIN, "Studies/mr_cli.lock", b"b", None, "lock")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn stale_overwrite_leaves_file_untouched() {
        let (dir, store) = backend();
        let first = store.write_file(MAIN, "a/b.json", b"1", None, "m").await.unwrap();
        store
            .write_file(MAIN, "a/b.json", b"2", Some(&first.content_sha), "m")
            .await
            .unwrap();
        let err = store
            .write_file(MAIN, "a/b.json", b"3", Some(&first.content_sha), "m")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(std::fs::read(dir.path().join("a/b.json")).unwrap(), b"2");
    }

    #[tokio::test]
    async fn list_dir_skips_temp_and_subdirs() {
        let (dir, store) = backend();
        store.write_file(MAIN, "Companies/Companies.json", b"[]", None, "m").await.unwrap();
        std::fs::create_dir_all(dir.path().join("Companies/nested")).unwrap();
        std::fs::write(dir.path().join("Companies/.mrcli-abc"), b"").unwrap();

        let entries = store.list_dir(MAIN, "Companies").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "Companies/Companies.json");
        assert!(store.list_dir(MAIN, "Nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_requires_matching_sha() {
        let (_dir, store) = backend();
        let receipt = store.write_file(MAIN, "x/y", b"1", None, "m").await.unwrap();
        let wrong = Sha::new("00").unwrap();
        assert!(matches!(
            store.delete_file(MAIN, "x/y", &wrong, "m").await.unwrap_err(),
            StoreError::Conflict { .. }
        ));
        store.delete_file(MAIN, "x/y", &receipt.content_sha, "m").await.unwrap();
        assert!(store.read_file(MAIN, "x/y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_escape_is_rejected() {
        let (_dir, store) = backend();
        assert!(store.read_file(MAIN, "../etc/passwd").await.is_err());
        assert!(store.read_file(MAIN, "/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn branch_head_tracks_content() {
        let (_dir, store) = backend();
        let empty = store.branch_head(MAIN).await.unwrap();
        store.write_file(MAIN, "a", b"1", None, "m").await.unwrap();
        let after = store.branch_head(MAIN).await.unwrap();
        assert_ne!(empty.sha, after.sha);
        assert!(store.branch_head("other").await.is_err());
    }
}
