//! Lightweight cross-references between containers.
//!
//! A link map records the names of related objects in another container,
//! each paired with the SHA-256 of that name. It is a content-addressed
//! pointer, not a relational reference: deleting the target leaves the
//! entry dangling.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Map from linked object name to `sha256_hex(name)`.
pub type LinkMap = BTreeMap<String, String>;

/// Hex SHA-256 of an object name.
pub fn link_hash(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

/// Build a link map over the given names.
pub fn link_names<'a, I>(names: I) -> LinkMap
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .map(|name| (name.to_string(), link_hash(name)))
        .collect()
}

/// Case-insensitive name equality used for every lookup by `name`.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
