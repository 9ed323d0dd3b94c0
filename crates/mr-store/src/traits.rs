use async_trait::async_trait;
use mr_types::{BranchRef, Sha};

use crate::error::StoreResult;
use crate::types::{DirEntry, FileBlob, WriteReceipt};

/// A version-controlled file store addressed by branch and path.
///
/// All implementations must satisfy these invariants:
/// - `write_file` with `expected = Some(sha)` succeeds only if the stored
///   file still has that SHA; otherwise it fails with `Conflict` and leaves
///   the file untouched.
/// - `write_file` with `expected = None` succeeds only if no file exists at
///   the path; otherwise it fails with `AlreadyExists`. Two concurrent
///   creates of the same path must never both succeed.
/// - `delete_file` is conditioned on the SHA the same way.
/// - A file is always replaced whole.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Human-readable backend description for logs.
    fn describe(&self) -> String;

    /// Current tip of `branch`.
    async fn branch_head(&self, branch: &str) -> StoreResult<BranchRef>;

    /// Read a file. Returns `Ok(None)` if it does not exist.
    async fn read_file(&self, branch: &str, path: &str) -> StoreResult<Option<FileBlob>>;

    /// Create or overwrite a file, conditioned on `expected`.
    async fn write_file(
        &self,
        branch: &str,
        path: &str,
        content: &[u8],
        expected: Option<&Sha>,
        message: &str,
    ) -> StoreResult<WriteReceipt>;

    /// Delete a file whose current SHA is `sha`.
    async fn delete_file(&self, branch: &str, path: &str, sha: &Sha, message: &str)
        -> StoreResult<()>;

    /// List the files directly under `dir`. A missing directory is empty.
    async fn list_dir(&self, branch: &str, dir: &str) -> StoreResult<Vec<DirEntry>>;
}
