//! Container lock manager for mrcli.
//!
//! A container is locked by creating `<Type>/<processName>.lock` in the
//! object store. Every cooperating writer uses the same process name, so
//! lock acquisition reduces to the backend's atomic create-if-absent: of two
//! racing lockers exactly one create succeeds.
//!
//! The lock file holds a JSON [`LockRecord`] naming its owner and the time
//! it was taken. A lock older than the configured threshold is treated as
//! abandoned by a crashed holder and may be overridden by the next locker.
//!
//! # Modules
//!
//! - [`error`]: [`LockError`]
//! - [`record`]: [`LockRecord`], the lock file body
//! - [`manager`]: [`LockManager`] and its result types

pub mod error;
pub mod manager;
pub mod record;

pub use error::{LockError, LockResult};
pub use manager::{ContainerLock, LockConfig, LockHolder, LockManager, LockStatus, UnlockOutcome};
pub use record::LockRecord;
