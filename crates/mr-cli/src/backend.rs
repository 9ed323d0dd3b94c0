use std::sync::Arc;

use anyhow::Context;
use mr_github::GitHubBackend;
use mr_store::{FsBackend, ObjectBackend};
use tracing::debug;

use crate::config::{BackendKind, Config};

/// Build the object store selected by `config`.
pub fn open_backend(config: &Config) -> anyhow::Result<Arc<dyn ObjectBackend>> {
    let backend: Arc<dyn ObjectBackend> = match config.default.backend {
        BackendKind::Github => Arc::new(GitHubBackend::new(config.github_settings()?)?),
        BackendKind::Local => {
            let root = config
                .default
                .local_root
                .clone()
                .context("default.local_root is not set")?;
            Arc::new(FsBackend::open_with_branch(root, &config.default.branch)?)
        }
    };
    debug!(backend = %backend.describe(), "opened object store");
    Ok(backend)
}
