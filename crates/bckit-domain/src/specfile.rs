//! Signed spec documents (`.spec.json` payloads).

use serde_json::{Map, Value};

const LAYOUT_VERSION_FIELD: &str = "buildcache_layout_version";
const CHECKSUM_FIELD: &str = "binary_cache_checksum";

#[derive(Debug, thiserror::Error)]
pub enum SpecDocumentError {
    #[error("spec document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("spec document is not a JSON object")]
    NotAnObject,
    #[error("spec document has no `{CHECKSUM_FIELD}` entry")]
    MissingChecksum,
    #[error("spec document has no node for hash {0}")]
    MissingNode(String),
}

/// Archive checksum recorded in a spec document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveChecksum {
    pub algorithm: String,
    pub checksum: String,
}

/// Package identity of one node of the spec DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecNode {
    pub name: String,
    pub version: String,
}

/// The JSON body of a signed spec file.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocument {
    fields: Map<String, Value>,
}

impl SpecDocument {
    pub fn parse(payload: &str) -> Result<Self, SpecDocumentError> {
        match serde_json::from_str(payload)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(SpecDocumentError::NotAnObject),
        }
    }

    pub fn archive_checksum(&self) -> Result<ArchiveChecksum, SpecDocumentError> {
        let entry = self
            .fields
            .get(CHECKSUM_FIELD)
            .ok_or(SpecDocumentError::MissingChecksum)?;
        let field = |name: &str| {
            entry
                .get(name)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        match (field("hash_algorithm"), field("hash")) {
            (Some(algorithm), Some(checksum)) => Ok(ArchiveChecksum {
                algorithm,
                checksum,
            }),
            _ => Err(SpecDocumentError::MissingChecksum),
        }
    }

    /// Name and version of the node whose hash is `hash`.
    pub fn node(&self, hash: &str) -> Result<SpecNode, SpecDocumentError> {
        self.fields
            .get("spec")
            .and_then(|spec| spec.get("nodes"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|node| node.get("hash").and_then(Value::as_str) == Some(hash))
            .and_then(|node| {
                Some(SpecNode {
                    name: node.get("name")?.as_str()?.to_string(),
                    version: node
                        .get("version")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .ok_or_else(|| SpecDocumentError::MissingNode(hash.to_string()))
    }

    /// Drop the v2 layout marker; the v3 spec blob does not carry it.
    pub fn strip_layout_version(&mut self) -> bool {
        self.fields.remove(LAYOUT_VERSION_FIELD).is_some()
    }

    /// Compact serialisation with stable key order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let ordered: std::collections::BTreeMap<_, _> = self.fields.iter().collect();
        serde_json::to_vec(&ordered).unwrap_or_default()
    }
}
