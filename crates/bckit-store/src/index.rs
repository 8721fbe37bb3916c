//! Fetching a mirror's index database.

use bckit_domain::{
    index_manifest_key, join_key, payload_or_plain, Layout, Manifest, MediaType, MirrorIndex,
    StoreObject,
};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

const V2_INDEX: &str = "build_cache/index.json";

/// A parsed index together with the object it was read from.
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub index: MirrorIndex,
    /// `index.json` (v2) or the index manifest (v3); its timestamp dates the index.
    pub object: StoreObject,
}

pub fn get_index(store: &dyn Store, prefix: &str, layout: Layout) -> StoreResult<IndexDocument> {
    match layout {
        Layout::V2 => {
            let key = join_key(prefix, V2_INDEX);
            let object = head_index(store, &key)?;
            let bytes = fetch_index(store, &key)?;
            let index = parse_index(&key, &bytes)?;
            debug!(key = %key, entries = index.len(), "loaded mirror index");
            Ok(IndexDocument { index, object })
        }
        Layout::V3 => {
            let manifest_key = index_manifest_key(prefix);
            let object = head_index(store, &manifest_key)?;
            let raw = fetch_index(store, &manifest_key)?;
            let text = String::from_utf8_lossy(&raw);
            let payload = payload_or_plain(&text).map_err(|err| StoreError::IndexParseError {
                key: manifest_key.clone(),
                reason: err.to_string(),
            })?;
            let manifest =
                Manifest::parse(payload.as_bytes()).map_err(|err| StoreError::IndexParseError {
                    key: manifest_key.clone(),
                    reason: err.to_string(),
                })?;
            let record =
                manifest
                    .blob(MediaType::Index)
                    .ok_or_else(|| StoreError::IndexParseError {
                        key: manifest_key.clone(),
                        reason: "manifest references no index blob".to_string(),
                    })?;
            let blob_key = record.key(prefix);
            let bytes = fetch_index(store, &blob_key)?;
            let index = parse_index(&blob_key, &bytes)?;
            debug!(key = %blob_key, entries = index.len(), "loaded mirror index");
            Ok(IndexDocument { index, object })
        }
    }
}

fn head_index(store: &dyn Store, key: &str) -> StoreResult<StoreObject> {
    store
        .head(key)?
        .ok_or_else(|| StoreError::IndexNotFound {
            key: key.to_string(),
        })
}

fn fetch_index(store: &dyn Store, key: &str) -> StoreResult<bytes::Bytes> {
    store.get(key).map_err(|err| match err {
        StoreError::NotFound { key } => StoreError::IndexNotFound { key },
        other => other,
    })
}

fn parse_index(key: &str, bytes: &[u8]) -> StoreResult<MirrorIndex> {
    MirrorIndex::parse(bytes).map_err(|err| StoreError::IndexParseError {
        key: key.to_string(),
        reason: err.to_string(),
    })
}
