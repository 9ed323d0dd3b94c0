use async_trait::async_trait;
use mr_store::{DirEntry, FileBlob, ObjectBackend, StoreError, StoreResult, WriteReceipt};
use mr_types::{BranchRef, Sha};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::wire::{
    classify, decode_content, encode_content, to_sha, ContentEntry, ContentFile, DeleteBody,
    GitBlob, GitRef, Op, PutBody, WriteResponse,
};

const API_VERSION: &str = "2022-11-28";

/// Connection settings for one GitHub repository.
#[derive(Clone, Debug)]
pub struct GitHubSettings {
    /// API root, `https://api.github.com` unless using GitHub Enterprise.
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub user_agent: String,
}

/// [`ObjectBackend`] over the GitHub Contents API.
pub struct GitHubBackend {
    client: Client,
    base: Url,
    settings: GitHubSettings,
}

impl GitHubBackend {
    pub fn new(settings: GitHubSettings) -> StoreResult<Self> {
        let base = Url::parse(&settings.api_url)
            .map_err(|e| StoreError::Transport(format!("invalid API url {}: {e}", settings.api_url)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "invalid API url {}",
                settings.api_url
            )));
        }
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base,
            settings,
        })
    }

    /// `{api}/repos/{owner}/{repo}/{segments...}` with each segment encoded.
    pub fn repo_url<'a, I>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push("repos")
                .push(&self.settings.owner)
                .push(&self.settings.repo)
                .extend(segments);
        }
        url
    }

    fn contents_url(&self, path: &str) -> Url {
        self.repo_url(std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty())))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.settings.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        self.authed(request)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    async fn fail(response: Response, op: Op, path: &str, expected: Option<&Sha>) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        classify(status, op, path, expected, &body)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Fetch a blob by SHA; used when the contents endpoint omits the body.
    async fn read_blob(&self, path: &str, sha: &str) -> StoreResult<Vec<u8>> {
        let url = self.repo_url(["git", "blobs", sha]);
        let response = self.send(self.client.get(url)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response, Op::Read, path, None).await);
        }
        let blob: GitBlob = Self::json(response).await?;
        if blob.encoding != "base64" {
            return Err(StoreError::Serialization(format!(
                "unsupported blob encoding {} for {path}",
                blob.encoding
            )));
        }
        decode_content(&blob.content)
    }
}

impl std::fmt::Debug for GitHubBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubBackend")
            .field("api_url", &self.settings.api_url)
            .field("owner", &self.settings.owner)
            .field("repo", &self.settings.repo)
            .finish()
    }
}

#[async_trait]
impl ObjectBackend for GitHubBackend {
    fn describe(&self) -> String {
        format!("github:{}/{}", self.settings.owner, self.settings.repo)
    }

    async fn branch_head(&self, branch: &str) -> StoreResult<BranchRef> {
        let url = self.repo_url(["git", "ref", "heads", branch]);
        let response = self.send(self.client.get(url)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(response, Op::Head, &format!("branch {branch}"), None).await);
        }
        let git_ref: GitRef = Self::json(response).await?;
        Ok(BranchRef {
            name: branch.to_string(),
            sha: to_sha(git_ref.object.sha)?,
        })
    }

    async fn read_file(&self, branch: &str, path: &str) -> StoreResult<Option<FileBlob>> {
        let request = self.client.get(self.contents_url(path)).query(&[("ref", branch)]);
        let response = self.send(request).await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::fail(response, Op::Read, path, None).await);
        }

        let value: serde_json::Value = Self::json(response).await?;
        if value.is_array() {
            return Err(StoreError::Serialization(format!("{path} is a directory")));
        }
        let file: ContentFile =
            serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let content = match file.encoding.as_str() {
            "base64" => decode_content(&file.content)?,
            // Files above 1 MB come back without a body.
            "none" | "" => self.read_blob(path, &file.sha).await?,
            other => {
                return Err(StoreError::Serialization(format!(
                    "unsupported encoding {other} for {path}"
                )));
            }
        };
        debug!(path, sha = %file.sha, bytes = content.len(), "github read");
        Ok(Some(FileBlob {
            content,
            sha: to_sha(file.sha)?,
        }))
    }

    async fn write_file(
        &self,
        branch: &str,
        path: &str,
        content: &[u8],
        expected: Option<&Sha>,
        message: &str,
    ) -> StoreResult<WriteReceipt> {
        let body = PutBody {
            message,
            content: encode_content(content),
            branch,
            sha: expected.map(Sha::as_str),
        };
        let response = self
            .send(self.client.put(self.contents_url(path)).json(&body))
            .await?;
        if !response.status().is_success() {
            let op = if expected.is_some() { Op::Update } else { Op::Create };
            return Err(Self::fail(response, op, path, expected).await);
        }

        let written: WriteResponse = Self::json(response).await?;
        let content_sha = written
            .content
            .ok_or_else(|| StoreError::Serialization(format!("no content sha for {path}")))?;
        debug!(path, commit = %written.commit.sha, "github write");
        Ok(WriteReceipt {
            content_sha: to_sha(content_sha.sha)?,
            commit_sha: to_sha(written.commit.sha)?,
        })
    }

    async fn delete_file(
        &self,
        branch: &str,
        path: &str,
        sha: &Sha,
        message: &str,
    ) -> StoreResult<()> {
        let body = DeleteBody {
            message,
            sha: sha.as_str(),
            branch,
        };
        let response = self
            .send(self.client.delete(self.contents_url(path)).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response, Op::Delete, path, Some(sha)).await);
        }
        debug!(path, "github delete");
        Ok(())
    }

    async fn list_dir(&self, branch: &str, dir: &str) -> StoreResult<Vec<DirEntry>> {
        let request = self.client.get(self.contents_url(dir)).query(&[("ref", branch)]);
        let response = self.send(request).await?;
        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::fail(response, Op::List, dir, None).await);
        }

        let entries: Vec<ContentEntry> = Self::json(response).await?;
        entries
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .map(|entry| {
                Ok(DirEntry {
                    name: entry.name,
                    path: entry.path,
                    sha: to_sha(entry.sha)?,
                })
            })
            .collect()
    }
}
