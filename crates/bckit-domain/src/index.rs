//! The mirror's `index.json` database.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One installed record of the index database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default)]
    pub in_buildcache: bool,
}

impl IndexEntry {
    /// `name@version` from the embedded spec, when present.
    pub fn display_name(&self) -> Option<String> {
        let name = self.spec.get("name")?.as_str()?;
        match self.spec.get("version").and_then(serde_json::Value::as_str) {
            Some(version) => Some(format!("{name}@{version}")),
            None => Some(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Database {
    #[serde(default)]
    installs: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IndexDocument {
    database: Database,
}

/// `hash -> {spec, in_buildcache}` as published by the mirror.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorIndex {
    installs: BTreeMap<String, IndexEntry>,
}

impl MirrorIndex {
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        let document: IndexDocument = serde_json::from_slice(bytes)?;
        Ok(Self {
            installs: document.database.installs,
        })
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, IndexEntry)>,
    {
        Self {
            installs: entries.into_iter().collect(),
        }
    }

    pub fn entry(&self, hash: &str) -> Option<&IndexEntry> {
        self.installs.get(hash)
    }

    pub fn len(&self) -> usize {
        self.installs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installs.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.installs.iter().map(|(hash, entry)| (hash.as_str(), entry))
    }

    /// Hashes the index claims are present in the build cache.
    pub fn registered(&self) -> BTreeSet<String> {
        self.installs
            .iter()
            .filter(|(_, entry)| entry.in_buildcache)
            .map(|(hash, _)| hash.clone())
            .collect()
    }

    pub fn is_registered(&self, hash: &str) -> bool {
        self.installs
            .get(hash)
            .is_some_and(|entry| entry.in_buildcache)
    }
}
