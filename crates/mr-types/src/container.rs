use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A named collection of domain objects of one type.
///
/// Each container is stored as a single JSON array at
/// `<Type>/<Type>.json` in the backing object store, and its lock files live
/// alongside it in `<Type>/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerName {
    Companies,
    Interactions,
    Studies,
}

impl ContainerName {
    /// Every container, in lock acquisition order.
    pub const ALL: [ContainerName; 3] = [
        ContainerName::Companies,
        ContainerName::Interactions,
        ContainerName::Studies,
    ];

    /// The canonical name, which doubles as the directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerName::Companies => "Companies",
            ContainerName::Interactions => "Interactions",
            ContainerName::Studies => "Studies",
        }
    }

    /// Directory holding the data file and lock files.
    pub fn directory(&self) -> &'static str {
        self.as_str()
    }

    /// Path of the JSON array file, e.g. `Companies/Companies.json`.
    pub fn data_path(&self) -> String {
        format!("{0}/{0}.json", self.as_str())
    }

    /// Path of the lock file for the given process name.
    pub fn lock_path(&self, process_name: &str) -> String {
        format!("{}/{process_name}.lock", self.as_str())
    }

    /// Field that other containers use to reference objects of this type.
    pub fn link_field(&self) -> &'static str {
        match self {
            ContainerName::Companies => "linked_companies",
            ContainerName::Interactions => "linked_interactions",
            ContainerName::Studies => "linked_studies",
        }
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "companies" | "company" => Ok(ContainerName::Companies),
            "interactions" | "interaction" => Ok(ContainerName::Interactions),
            "studies" | "study" => Ok(ContainerName::Studies),
            _ => Err(TypeError::UnknownContainer(s.to_string())),
        }
    }
}
