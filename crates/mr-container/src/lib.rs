//! Read-merge-write sessions over locked containers.
//!
//! A session *catches* its containers (locks them in sorted order and reads
//! their objects), lets the [`Writer`] merge and CAS-write, and finally
//! *releases* every lock. The [`RepoMetadata`] value threads through all
//! three steps and is consumed by release.
//!
//! # Key Types
//!
//! - [`Catcher`]: lock acquisition with rollback, reads, release
//! - [`Writer`]: CAS writes with bounded retry on conflict
//! - [`RepoMetadata`]: per-session snapshots and held locks
//! - [`ContainerError`]: failure kinds with their status codes

pub mod catcher;
pub mod error;
pub mod metadata;
pub mod writer;

pub use catcher::{Catcher, ReleaseReport};
pub use error::{ContainerError, ContainerResult};
pub use metadata::{ContainerSnapshot, RepoMetadata};
pub use writer::{RetryPolicy, Writer};
