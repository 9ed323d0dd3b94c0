use std::collections::BTreeMap;

use mr_lock::ContainerLock;
use mr_store::ObjectBackend;
use mr_types::{BranchRef, ContainerName, Sha};
use serde_json::Value;

use crate::error::{ContainerError, ContainerResult};

/// Objects of one container as read, plus the SHA they were read at.
///
/// `sha` is `None` when the data file does not exist yet; the first write
/// then creates it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerSnapshot {
    pub objects: Vec<Value>,
    pub sha: Option<Sha>,
}

/// Session state for one catch/write/release cycle.
#[derive(Debug, Default)]
pub struct RepoMetadata {
    pub containers: BTreeMap<ContainerName, ContainerSnapshot>,
    pub branch: Option<BranchRef>,
    pub locks: BTreeMap<ContainerName, ContainerLock>,
}

impl RepoMetadata {
    /// Metadata requesting the given containers, not yet caught.
    pub fn for_containers<I>(names: I) -> Self
    where
        I: IntoIterator<Item = ContainerName>,
    {
        Self {
            containers: names
                .into_iter()
                .map(|name| (name, ContainerSnapshot::default()))
                .collect(),
            ..Self::default()
        }
    }

    /// Requested containers in lock order.
    pub fn requested(&self) -> Vec<ContainerName> {
        self.containers.keys().copied().collect()
    }

    pub fn snapshot(&self, name: ContainerName) -> Option<&ContainerSnapshot> {
        self.containers.get(&name)
    }

    pub fn objects(&self, name: ContainerName) -> &[Value] {
        self.containers
            .get(&name)
            .map(|s| s.objects.as_slice())
            .unwrap_or_default()
    }

    pub fn is_held(&self, name: ContainerName) -> bool {
        self.locks.contains_key(&name)
    }
}

/// Read a container's data file. A missing or empty file is an empty array.
pub(crate) async fn read_snapshot(
    backend: &dyn ObjectBackend,
    branch: &str,
    name: ContainerName,
) -> ContainerResult<ContainerSnapshot> {
    let path = name.data_path();
    let Some(blob) = backend.read_file(branch, &path).await? else {
        return Ok(ContainerSnapshot::default());
    };
    let objects = if blob.content.iter().all(u8::is_ascii_whitespace) {
        Vec::new()
    } else {
        serde_json::from_slice::<Vec<Value>>(&blob.content)
            .map_err(|e| ContainerError::Serialization(format!("{path}: {e}")))?
    };
    Ok(ContainerSnapshot {
        objects,
        sha: Some(blob.sha),
    })
}
