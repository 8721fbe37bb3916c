use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::object::StoreObject;

/// Role an object plays for its spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectRole {
    /// Signed spec metadata, or (v3) the signed manifest and the spec blob.
    Meta,
    Archive,
}

/// One concrete package build as it exists in one mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltSpec {
    pub hash: String,
    /// Originating stack, empty for the root mirror.
    pub stack: String,
    /// v2: the `.spec.json.sig` object. v3: the spec blob referenced by the manifest.
    pub meta: Option<StoreObject>,
    /// v2: the `.spack` object. v3: the archive blob referenced by the manifest.
    pub archive: Option<StoreObject>,
    /// v3 only.
    pub manifest: Option<StoreObject>,
    /// v3 only: local cached copy of the manifest.
    pub manifest_local_path: Option<PathBuf>,
}

impl BuiltSpec {
    pub fn new(stack: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            stack: stack.into(),
            meta: None,
            archive: None,
            manifest: None,
            manifest_local_path: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.meta.is_some() && self.archive.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn meta_key(&self) -> Option<&str> {
        self.meta.as_ref().map(|object| object.key.as_str())
    }

    pub fn archive_key(&self) -> Option<&str> {
        self.archive.as_ref().map(|object| object.key.as_str())
    }

    /// Every object that describes this spec (as opposed to its payload).
    pub fn meta_objects(&self) -> Vec<&StoreObject> {
        self.manifest.iter().chain(self.meta.iter()).collect()
    }

    /// All objects belonging to this spec, tagged with their role.
    pub fn objects(&self) -> Vec<(ObjectRole, &StoreObject)> {
        let mut objects: Vec<_> = self
            .meta_objects()
            .into_iter()
            .map(|object| (ObjectRole::Meta, object))
            .collect();
        if let Some(archive) = &self.archive {
            objects.push((ObjectRole::Archive, archive));
        }
        objects
    }

    /// Display name: `<stack>/<hash>` or just the hash for root specs.
    pub fn label(&self) -> String {
        if self.stack.is_empty() {
            self.hash.clone()
        } else {
            format!("{}/{}", self.stack, self.hash)
        }
    }
}
