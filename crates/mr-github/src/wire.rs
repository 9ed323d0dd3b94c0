//! Request/response bodies and status mapping for the Contents API.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mr_store::StoreError;
use mr_types::Sha;
use serde::{Deserialize, Serialize};

/// A single file returned by `GET contents/{path}`.
#[derive(Debug, Deserialize)]
pub struct ContentFile {
    pub sha: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}

/// One element of a directory listing.
#[derive(Debug, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct ShaRef {
    pub sha: String,
}

/// Response to a PUT on `contents/{path}`.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    pub content: Option<ShaRef>,
    pub commit: ShaRef,
}

/// `git/ref/heads/{branch}` response.
#[derive(Debug, Deserialize)]
pub struct GitRef {
    pub object: ShaRef,
}

/// `git/blobs/{sha}` response.
#[derive(Debug, Deserialize)]
pub struct GitBlob {
    pub content: String,
    pub encoding: String,
}

#[derive(Debug, Serialize)]
pub struct PutBody<'a> {
    pub message: &'a str,
    pub content: String,
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct DeleteBody<'a> {
    pub message: &'a str,
    pub sha: &'a str,
    pub branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// The operation a response belongs to; decides how 409/422 are read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Read,
    List,
    Head,
    Create,
    Update,
    Delete,
}

pub fn encode_content(content: &[u8]) -> String {
    BASE64.encode(content)
}

/// Decode base64 content; GitHub wraps it at 60 columns.
pub fn decode_content(encoded: &str) -> Result<Vec<u8>, StoreError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| StoreError::Serialization(format!("invalid base64 content: {e}")))
}

pub fn to_sha(token: String) -> Result<Sha, StoreError> {
    Sha::new(token).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Pull `message` out of a GitHub error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Map a non-success status to a store error.
pub fn classify(status: u16, op: Op, path: &str, expected: Option<&Sha>, body: &str) -> StoreError {
    let message = error_message(body);
    match (status, op) {
        (404, _) => StoreError::NotFound(path.to_string()),
        (422, Op::Create) => StoreError::AlreadyExists(path.to_string()),
        (409, _) | (422, Op::Update | Op::Delete) => StoreError::Conflict {
            path: path.to_string(),
            expected: expected.map(|s| s.to_string()).unwrap_or_default(),
            actual: message,
        },
        (401, _) => StoreError::Unauthorized(message),
        (403, _) => StoreError::PermissionDenied(message),
        (status, _) => StoreError::Backend { status, message },
    }
}
