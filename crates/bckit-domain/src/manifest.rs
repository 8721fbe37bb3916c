//! Content-addressable (v3) manifest documents.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::layout::join_key;

pub const ARCHIVE_MEDIA_TYPE: &str = "application/vnd.spack.install.v2.tar+gzip";
pub const SPEC_MEDIA_TYPE: &str = "application/vnd.spack.spec.v5+json";
pub const KEY_MEDIA_TYPE: &str = "application/pgp-keys";
pub const INDEX_MEDIA_TYPE: &str = "application/vnd.spack.db.v8+json";

const MANIFEST_VERSION: u32 = 3;

/// Blob kinds a manifest may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Archive,
    Spec,
    Key,
    Index,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Archive => ARCHIVE_MEDIA_TYPE,
            Self::Spec => SPEC_MEDIA_TYPE,
            Self::Key => KEY_MEDIA_TYPE,
            Self::Index => INDEX_MEDIA_TYPE,
        }
    }
}

/// One blob entry of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRecord {
    pub content_length: u64,
    pub media_type: String,
    pub compression: String,
    pub checksum_algorithm: String,
    pub checksum: String,
}

impl BlobRecord {
    /// Key of this blob under `mirror_prefix`.
    pub fn key(&self, mirror_prefix: &str) -> String {
        blob_key(mirror_prefix, &self.checksum_algorithm, &self.checksum)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub data: Vec<BlobRecord>,
}

impl Manifest {
    pub fn new(data: Vec<BlobRecord>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            data,
        }
    }

    pub fn parse(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec_pretty(self).unwrap_or_default()
    }

    /// First blob with the given media type.
    pub fn blob(&self, media_type: MediaType) -> Option<&BlobRecord> {
        self.data
            .iter()
            .find(|record| record.media_type == media_type.as_str())
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `<prefix>/blobs/<algo>/<first two hex chars>/<checksum>`.
pub fn blob_key(mirror_prefix: &str, algorithm: &str, checksum: &str) -> String {
    let shard = checksum.get(..2).unwrap_or(checksum);
    join_key(
        mirror_prefix,
        &format!("blobs/{algorithm}/{shard}/{checksum}"),
    )
}

/// `<prefix>/v3/manifests/spec/<name>/<name>-<version>-<hash>.spec.manifest.json`.
pub fn spec_manifest_key(mirror_prefix: &str, name: &str, version: &str, hash: &str) -> String {
    join_key(
        mirror_prefix,
        &format!("v3/manifests/spec/{name}/{name}-{version}-{hash}.spec.manifest.json"),
    )
}

/// `<prefix>/v3/manifests/key/<fingerprint>.key.manifest.json`.
pub fn key_manifest_key(mirror_prefix: &str, fingerprint: &str) -> String {
    join_key(
        mirror_prefix,
        &format!("v3/manifests/key/{fingerprint}.key.manifest.json"),
    )
}

/// `<prefix>/v3/manifests/index/index.manifest.json`.
pub fn index_manifest_key(mirror_prefix: &str) -> String {
    join_key(mirror_prefix, "v3/manifests/index/index.manifest.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_uses_camel_case_fields() {
        let manifest = Manifest::new(vec![BlobRecord {
            content_length: 10,
            media_type: ARCHIVE_MEDIA_TYPE.to_string(),
            compression: "gzip".to_string(),
            checksum_algorithm: "sha256".to_string(),
            checksum: "ab12".to_string(),
        }]);
        let value: serde_json::Value =
            serde_json::from_slice(&manifest.to_json_bytes()).expect("json");
        assert_eq!(value["version"], 3);
        assert_eq!(value["data"][0]["contentLength"], 10);
        assert_eq!(value["data"][0]["checksumAlgorithm"], "sha256");
        assert!(manifest.blob(MediaType::Archive).is_some());
        assert!(manifest.blob(MediaType::Spec).is_none());
    }

    #[test]
    fn blob_keys_are_sharded_by_checksum_prefix() {
        assert_eq!(
            blob_key("develop/e4s", "sha256", "abcdef"),
            "develop/e4s/blobs/sha256/ab/abcdef"
        );
        assert_eq!(blob_key("", "sha256", "a"), "blobs/sha256/a/a");
        assert_eq!(
            spec_manifest_key("develop", "zlib", "1.3", "h"),
            "develop/v3/manifests/spec/zlib/zlib-1.3-h.spec.manifest.json"
        );
    }
}
