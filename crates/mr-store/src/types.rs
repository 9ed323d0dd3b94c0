use mr_types::Sha;

/// File content together with the SHA it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileBlob {
    pub content: Vec<u8>,
    pub sha: Sha,
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// File name without the directory, e.g. `mr_cli.lock`.
    pub name: String,
    /// Full path from the repository root.
    pub path: String,
    pub sha: Sha,
}

/// Result of a successful write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteReceipt {
    /// SHA of the newly stored content; the token for the next CAS.
    pub content_sha: Sha,
    /// SHA of the commit that recorded the write.
    pub commit_sha: Sha,
}

/// BLAKE3 content SHA used by the local backends.
pub fn content_sha(content: &[u8]) -> Sha {
    Sha::from_digest(blake3::hash(content).as_bytes())
}
