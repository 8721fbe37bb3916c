//! Hashes that must survive pruning.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

const LOCKFILE_NAME: &str = "spack.lock";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepSet {
    hashes: BTreeSet<String>,
}

impl KeepSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a newline-delimited keep list. Blank lines and `#` comments are ignored.
    pub fn parse(contents: &str) -> Self {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read keep list {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut contents = String::new();
        for hash in &self.hashes {
            contents.push_str(hash);
            contents.push('\n');
        }
        fs::write(path, contents)
            .with_context(|| format!("failed to write keep list {}", path.display()))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn insert(&mut self, hash: impl Into<String>) -> bool {
        self.hashes.insert(hash.into())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hashes.iter().map(String::as_str)
    }
}

impl FromIterator<String> for KeepSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            hashes: iter.into_iter().collect(),
        }
    }
}

impl Extend<String> for KeepSet {
    fn extend<T: IntoIterator<Item = String>>(&mut self, iter: T) {
        self.hashes.extend(iter);
    }
}

/// Union of every `concrete_specs` hash in the `spack.lock` files under `root`.
///
/// Returns the keep set and the number of lockfiles read. Unparseable lockfiles
/// are skipped with a warning.
pub fn collect_lockfile_hashes(root: &Path) -> Result<(KeepSet, usize)> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    let mut keep = KeepSet::new();
    let mut lockfiles = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() || entry.file_name() != LOCKFILE_NAME {
            continue;
        }
        let path = entry.path();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let document: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(document) => document,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unparseable lockfile");
                continue;
            }
        };
        let Some(specs) = document
            .get("concrete_specs")
            .and_then(serde_json::Value::as_object)
        else {
            warn!(path = %path.display(), "lockfile has no concrete_specs");
            continue;
        };
        debug!(path = %path.display(), specs = specs.len(), "read lockfile");
        keep.extend(specs.keys().cloned());
        lockfiles += 1;
    }
    Ok((keep, lockfiles))
}
