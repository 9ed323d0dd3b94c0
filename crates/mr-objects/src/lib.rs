//! Typed repositories over mrcli containers.
//!
//! [`ContainerRepository<T>`] pairs the catch/write/release session from
//! `mr-container` with a per-type [`TypePolicy`]: which fields an update may
//! touch, and what happens to linked records when a record is deleted.
//!
//! # Key Types
//!
//! - [`Repositories`]: builds a repository for each record type
//! - [`ContainerRepository`]: find, create, update, delete for one type
//! - [`TypePolicy`] / [`Cascade`]: update whitelist and delete cascade
//! - [`RepositoryError`]: failures surfaced to the CLI

pub mod error;
pub mod policy;
pub mod repository;

pub use error::{RepositoryError, RepositoryResult};
pub use policy::{Cascade, TypePolicy};
pub use repository::{ContainerRepository, DeleteReport, Listing, Repositories};
