use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use mr_types::{BranchRef, Sha};

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectBackend;
use crate::types::{content_sha, DirEntry, FileBlob, WriteReceipt};

#[derive(Debug, Default)]
struct BranchState {
    files: BTreeMap<String, FileBlob>,
    commits: u64,
}

impl BranchState {
    fn commit_sha(branch: &str, commits: u64) -> Sha {
        Sha::from_digest(blake3::hash(format!("{branch}:{commits}").as_bytes()).as_bytes())
    }

    fn commit(&mut self, branch: &str) -> Sha {
        self.commits += 1;
        Self::commit_sha(branch, self.commits)
    }
}

/// In-memory, HashMap-based backend.
///
/// Intended for tests. Every branch holds its files behind one `RwLock`, so
/// each operation is atomic with respect to the others: two concurrent
/// create-if-absent writes of one path cannot both succeed.
pub struct InMemoryBackend {
    branches: RwLock<HashMap<String, BranchState>>,
}

impl InMemoryBackend {
    /// Create a backend with an empty `main` branch.
    pub fn new() -> Self {
        Self::with_branch("main")
    }

    /// Create a backend with a single empty branch.
    pub fn with_branch(name: &str) -> Self {
        let mut branches = HashMap::new();
        branches.insert(name.to_string(), BranchState::default());
        Self {
            branches: RwLock::new(branches),
        }
    }

    /// Store `content` at `path` under an explicit SHA, bypassing CAS.
    ///
    /// Used to set up fixtures with known tokens.
    pub fn seed(&self, branch: &str, path: &str, content: &[u8], sha: Sha) {
        let mut branches = self.branches.write().expect("lock poisoned");
        let state = branches.entry(branch.to_string()).or_default();
        state.files.insert(
            path.to_string(),
            FileBlob {
                content: content.to_vec(),
                sha,
            },
        );
        state.commit(branch);
    }

    /// Raw content at `path`, if present.
    pub fn content(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        let branches = self.branches.read().expect("lock poisoned");
        branches
            .get(branch)
            .and_then(|state| state.files.get(path))
            .map(|blob| blob.content.clone())
    }

    /// Sorted list of every file path on `branch`.
    pub fn paths(&self, branch: &str) -> Vec<String> {
        let branches = self.branches.read().expect("lock poisoned");
        branches
            .get(branch)
            .map(|state| state.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of commits recorded on `branch`.
    pub fn commit_count(&self, branch: &str) -> u64 {
        let branches = self.branches.read().expect("lock poisoned");
        branches.get(branch).map(|state| state.commits).unwrap_or(0)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let branches = self.branches.read().expect("lock poisoned");
        f.debug_struct("InMemoryBackend")
            .field("branches", &branches.len())
            .finish()
    }
}

fn no_branch(branch: &str) -> StoreError {
    StoreError::NotFound(format!("branch {branch}"))
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn branch_head(&self, branch: &str) -> StoreResult<BranchRef> {
        let branches = self.branches.read().expect("lock poisoned");
        let state = branches.get(branch).ok_or_else(|| no_branch(branch))?;
        Ok(BranchRef {
            name: branch.to_string(),
            sha: BranchState::commit_sha(branch, state.commits),
        })
    }

    async fn read_file(&self, branch: &str, path: &str) -> StoreResult<Option<FileBlob>> {
        let branches = self.branches.read().expect("lock poisoned");
        let state = branches.get(branch).ok_or_else(|| no_branch(branch))?;
        Ok(state.files.get(path).cloned())
    }

    async fn write_file(
        &self,
        branch: &str,
        path: &str,
        content: &[u8],
        expected: Option<&Sha>,
        _message: &str,
    ) -> StoreResult<WriteReceipt> {
        let mut branches = self.branches.write().expect("lock poisoned");
        let state = branches.get_mut(branch).ok_or_else(|| no_branch(branch))?;

        match (state.files.get(path), expected) {
            (Some(_), None) => return Err(StoreError::AlreadyExists(path.to_string())),
            (None, Some(_)) => return Err(StoreError::NotFound(path.to_string())),
            (Some(current), Some(expected)) if current.sha != *expected => {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                    expected: expected.to_string(),
                    actual: current.sha.to_string(),
                });
            }
            _ => {}
        }

        let sha = content_sha(content);
        state.files.insert(
            path.to_string(),
            FileBlob {
                content: content.to_vec(),
                sha: sha.clone(),
            },
        );
        let commit_sha = state.commit(branch);
        Ok(WriteReceipt {
            content_sha: sha,
            commit_sha,
        })
    }

    async fn delete_file(
        &self,
        branch: &str,
        path: &str,
        sha: &Sha,
        _message: &str,
    ) -> StoreResult<()> {
        let mut branches = self.branches.write().expect("lock poisoned");
        let state = branches.get_mut(branch).ok_or_else(|| no_branch(branch))?;

        let current = state
            .files
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if current.sha != *sha {
            return Err(StoreError::Conflict {
                path: path.to_string(),
                expected: sha.to_string(),
                actual: current.sha.to_string(),
            });
        }
        state.files.remove(path);
        state.commit(branch);
        Ok(())
    }

    async fn list_dir(&self, branch: &str, dir: &str) -> StoreResult<Vec<DirEntry>> {
        let branches = self.branches.read().expect("lock poisoned");
        let state = branches.get(branch).ok_or_else(|| no_branch(branch))?;
        let prefix = format!("{}/", dir.trim_end_matches('/'));

        Ok(state
            .files
            .iter()
            .filter_map(|(path, blob)| {
                let name = path.strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                Some(DirEntry {
                    name: name.to_string(),
                    path: path.clone(),
                    sha: blob.sha.clone(),
                })
            })
            .collect())
    }
}
