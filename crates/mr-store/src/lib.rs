//! Object store backends for mrcli.
//!
//! Containers and lock files live in a version-controlled file store: a
//! repository with branches, commits, and file blobs addressed by path and
//! SHA. This crate defines the [`ObjectBackend`] contract the locking
//! protocol is built on, plus two local implementations. The GitHub
//! implementation lives in `mr-github`.
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- `HashMap`-based store for tests
//! - [`FsBackend`] -- a plain directory on local disk, single branch
//!
//! # Contract
//!
//! 1. Every read returns the content SHA of the file.
//! 2. Overwrites are compare-and-swap on that SHA; a stale SHA is a
//!    [`StoreError::Conflict`], never a silent overwrite.
//! 3. Writes without a prior SHA are create-if-absent; an existing file is a
//!    [`StoreError::AlreadyExists`]. Lock acquisition depends on this.
//! 4. Files are replaced whole; readers never see a partial write.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use fs::FsBackend;
pub use memory::InMemoryBackend;
pub use traits::ObjectBackend;
pub use types::{content_sha, DirEntry, FileBlob, WriteReceipt};
