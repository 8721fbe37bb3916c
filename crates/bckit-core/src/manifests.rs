//! Local cache of downloaded v3 manifests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bckit_domain::{payload_or_plain, sha256_hex, Manifest, ManifestResolver, ResolvedManifest, StoreObject};
use bckit_store::Store;
use tempfile::NamedTempFile;
use tracing::debug;

/// Resolves manifests through the store, keeping a copy of each under `dir`.
///
/// Cache entries are keyed by object URL, size, and modification time, so a
/// rewritten manifest is fetched again.
pub struct ManifestCache<'a> {
    store: &'a dyn Store,
    dir: PathBuf,
}

impl<'a> ManifestCache<'a> {
    pub fn new(store: &'a dyn Store, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
        }
    }

    pub fn path_for(&self, object: &StoreObject) -> PathBuf {
        let identity = format!(
            "{object}|{}|{}",
            object.size,
            object.last_modified.unix_timestamp()
        );
        self.dir.join(format!("{}.json", sha256_hex(identity.as_bytes())))
    }

    /// Raw (possibly clearsigned) manifest text.
    pub fn fetch(&self, object: &StoreObject) -> Result<(String, PathBuf)> {
        let path = self.path_for(object);
        if let Ok(text) = fs::read_to_string(&path) {
            debug!(key = %object.key, "manifest cache hit");
            return Ok((text, path));
        }
        let bytes = self
            .store
            .get(&object.key)
            .with_context(|| format!("failed to download manifest {}", object.key))?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| anyhow!("manifest {} is not UTF-8", object.key))?;
        persist(&self.dir, &path, text.as_bytes())?;
        Ok((text, path))
    }
}

impl ManifestResolver for ManifestCache<'_> {
    fn resolve(&self, manifest: &StoreObject) -> Result<ResolvedManifest> {
        let (text, path) = self.fetch(manifest)?;
        let payload = payload_or_plain(&text)
            .with_context(|| format!("manifest {} has a broken signature envelope", manifest.key))?;
        let parsed = Manifest::parse(payload.as_bytes())
            .with_context(|| format!("manifest {} is not valid JSON", manifest.key))?;
        Ok(ResolvedManifest {
            manifest: parsed,
            local_path: Some(path),
        })
    }
}

fn persist(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path)
        .map_err(|err| anyhow!("unable to persist {}: {err}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bckit_domain::{BlobRecord, ARCHIVE_MEDIA_TYPE};
    use bckit_store::FsStore;
    use bytes::Bytes;

    #[test]
    fn resolves_and_caches_manifests() -> Result<()> {
        let mirror = tempfile::tempdir()?;
        let cache = tempfile::tempdir()?;
        let store = FsStore::new(mirror.path());
        let manifest = Manifest::new(vec![BlobRecord {
            content_length: 1,
            media_type: ARCHIVE_MEDIA_TYPE.into(),
            compression: "gzip".into(),
            checksum_algorithm: "sha256".into(),
            checksum: "ab".repeat(32),
        }]);
        let key = "v3/manifests/spec/zlib/zlib-1.3-h.spec.manifest.json";
        store.put(key, Bytes::from(manifest.to_json_bytes()))?;
        let object = store.head(key)?.expect("manifest object");

        let resolver = ManifestCache::new(&store, cache.path());
        let resolved = resolver.resolve(&object)?;
        assert_eq!(resolved.manifest, manifest);
        let local = resolved.local_path.expect("cached path");
        assert!(local.starts_with(cache.path()));

        fs::remove_file(mirror.path().join(key))?;
        assert_eq!(resolver.resolve(&object)?.manifest, manifest);
        Ok(())
    }
}
