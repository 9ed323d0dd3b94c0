//! Foundation types for mrcli.
//!
//! This crate provides the identifiers and domain records shared by every
//! other mrcli crate. It performs no I/O.
//!
//! # Key Types
//!
//! - [`ContainerName`]: The closed set of object containers (`Companies`, ...)
//! - [`Sha`]: Opaque content version token used for compare-and-swap writes
//! - [`BranchRef`]: A branch name paired with its tip commit SHA
//! - [`Company`], [`Interaction`], [`Study`]: Domain records
//! - [`LinkMap`]: Name → SHA-256 cross-reference map between containers
//! - [`Clock`]: Injectable wall clock used for lock ages and timestamps

pub mod container;
pub mod error;
pub mod link;
pub mod object;
pub mod sha;
pub mod temporal;

pub use container::ContainerName;
pub use error::TypeError;
pub use link::{link_hash, link_names, names_match, LinkMap};
pub use object::{Company, ContainerObject, Interaction, Scalar, Study};
pub use sha::{BranchRef, Sha};
pub use temporal::{Clock, ManualClock, SystemClock};
