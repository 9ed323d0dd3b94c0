use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque content version token.
///
/// Every read of a file returns the SHA of its current content; every
/// overwrite must present the SHA it believes is current. The token is never
/// interpreted beyond equality: GitHub hands out git blob SHAs, the local
/// backends use BLAKE3 hex digests.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(String);

impl Sha {
    /// Wrap a backend-provided token. Empty tokens are rejected.
    pub fn new(token: impl Into<String>) -> Result<Self, TypeError> {
        let token = token.into();
        if token.is_empty() {
            return Err(TypeError::EmptySha);
        }
        Ok(Self(token))
    }

    /// Hex-encode a digest computed by a backend that hashes content itself.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Debug for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha({})", self.short())
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A branch and the commit SHA at its tip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub sha: Sha,
}
