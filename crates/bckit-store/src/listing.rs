//! On-disk cache of flat mirror listings.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bckit_domain::format_listing_line;
use fs4::FileExt;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// `<store id>/<prefix>`, the URL a listing is cached under.
pub fn listing_url(store: &dyn Store, prefix: &str) -> String {
    let id = store.id().trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        id.to_string()
    } else {
        format!("{id}/{prefix}")
    }
}

/// Listings written to `<dir>/<sha256(url)>.txt`, reused until forced or invalidated.
#[derive(Debug)]
pub struct ListingCache {
    dir: PathBuf,
    refreshed: Mutex<HashSet<PathBuf>>,
}

impl ListingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            refreshed: Mutex::new(HashSet::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        self.dir.join(format!("{digest}.txt"))
    }

    /// Path of the cached listing of `prefix`, listing the store first if needed.
    ///
    /// `force` re-lists at most once per URL for the lifetime of this cache.
    pub fn listing(&self, store: &dyn Store, prefix: &str, force: bool) -> StoreResult<PathBuf> {
        let url = listing_url(store, prefix);
        let path = self.path_for(&url);
        fs::create_dir_all(&self.dir).map_err(|err| StoreError::io(&self.dir, err))?;

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|err| StoreError::io(&lock_path, err))?;
        lock.lock_exclusive()
            .map_err(|err| StoreError::io(&lock_path, err))?;

        let already_refreshed = self.was_refreshed(&path);
        if path.exists() && (!force || already_refreshed) {
            debug!(url = %url, path = %path.display(), "using cached listing");
            return Ok(path);
        }

        info!(url = %url, "listing mirror");
        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|err| StoreError::io(&self.dir, err))?;
        let mut count = 0usize;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for object in store.list(prefix)? {
                let object = object?;
                writeln!(writer, "{}", format_listing_line(&object))
                    .map_err(|err| StoreError::io(&path, err))?;
                count += 1;
            }
            writer.flush().map_err(|err| StoreError::io(&path, err))?;
        }
        tmp.persist(&path)
            .map_err(|err| StoreError::io(&path, err.error))?;
        self.mark_refreshed(path.clone());
        debug!(url = %url, objects = count, path = %path.display(), "listing cached");
        Ok(path)
    }

    /// Drop the cached listing of `prefix`. Returns whether a file was removed.
    pub fn invalidate(&self, store: &dyn Store, prefix: &str) -> StoreResult<bool> {
        let path = self.path_for(&listing_url(store, prefix));
        if let Ok(mut refreshed) = self.refreshed.lock() {
            refreshed.remove(&path);
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "invalidated cached listing");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    fn was_refreshed(&self, path: &Path) -> bool {
        self.refreshed
            .lock()
            .map(|refreshed| refreshed.contains(path))
            .unwrap_or(false)
    }

    fn mark_refreshed(&self, path: PathBuf) {
        if let Ok(mut refreshed) = self.refreshed.lock() {
            refreshed.insert(path);
        }
    }
}
