//! GitHub backend for mrcli.
//!
//! Implements [`mr_store::ObjectBackend`] on top of the GitHub REST Contents
//! API. Every container write is a commit on the configured branch; the git
//! blob SHA returned by the API is the compare-and-swap token.
//!
//! # Endpoints
//!
//! - `GET /repos/{owner}/{repo}/git/ref/heads/{branch}` -- branch head
//! - `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}` -- read/list
//! - `PUT /repos/{owner}/{repo}/contents/{path}` -- create or CAS update
//! - `DELETE /repos/{owner}/{repo}/contents/{path}` -- CAS delete
//! - `GET /repos/{owner}/{repo}/git/blobs/{sha}` -- files above 1 MB
//!
//! Creating a file without a `sha` fails with 422 if the file exists, which
//! is what makes lock acquisition race-free.

pub mod backend;
pub mod wire;

pub use backend::{GitHubBackend, GitHubSettings};
