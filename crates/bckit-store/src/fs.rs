//! Directory-backed store. Keys are `/`-separated paths relative to the root.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bckit_domain::StoreObject;
use bytes::Bytes;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::debug;
use walkdir::WalkDir;

use crate::delete::DeleteFailure;
use crate::error::{StoreError, StoreResult};
use crate::store::{ObjectIter, Store};

const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct FsStore {
    id: String,
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            id: format!("file://{}", root.display()),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    fn object(&self, path: &Path, metadata: &fs::Metadata) -> Option<StoreObject> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let key = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let modified = metadata
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Some(StoreObject::new(&self.id, key, metadata.len(), modified))
    }

    fn ensure_parent(path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
        }
        Ok(())
    }
}

impl Store for FsStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn list(&self, prefix: &str) -> StoreResult<ObjectIter<'_>> {
        let base = self.path(prefix);
        if !base.exists() {
            return Ok(Box::new(std::iter::empty()));
        }
        let walker = WalkDir::new(base)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let metadata = match entry.metadata() {
                        Ok(metadata) => metadata,
                        Err(err) => {
                            return Some(Err(StoreError::io(
                                entry.path(),
                                io::Error::other(err.to_string()),
                            )))
                        }
                    };
                    self.object(entry.path(), &metadata).map(Ok)
                }
                Ok(_) => None,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    Some(Err(StoreError::io(path, io::Error::other(err.to_string()))))
                }
            });
        Ok(Box::new(walker))
    }

    fn get(&self, key: &str) -> StoreResult<Bytes> {
        let path = self.path(key);
        match fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    fn head(&self, key: &str) -> StoreResult<Option<StoreObject>> {
        let path = self.path(key);
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(self.object(&path, &metadata)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    fn put(&self, key: &str, data: Bytes) -> StoreResult<()> {
        let path = self.path(key);
        Self::ensure_parent(&path)?;
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = NamedTempFile::new_in(dir).map_err(|err| StoreError::io(dir, err))?;
        tmp.write_all(&data)
            .map_err(|err| StoreError::io(tmp.path(), err))?;
        tmp.persist(&path)
            .map_err(|err| StoreError::io(&path, err.error))?;
        Ok(())
    }

    fn copy(&self, from: &str, to: &str, size: u64) -> StoreResult<()> {
        let source = self.path(from);
        let dest = self.path(to);
        if !source.is_file() {
            return Err(StoreError::NotFound {
                key: from.to_string(),
            });
        }
        Self::ensure_parent(&dest)?;
        let copied = fs::copy(&source, &dest).map_err(|err| StoreError::io(&dest, err))?;
        debug!(from, to, size, copied, "copied object");
        Ok(())
    }

    fn delete_batch(&self, keys: &[String]) -> StoreResult<Vec<DeleteFailure>> {
        let mut failures = Vec::new();
        for key in keys {
            match fs::remove_file(self.path(key)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => failures.push(DeleteFailure {
                    key: key.clone(),
                    message: err.to_string(),
                }),
            }
        }
        Ok(failures)
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }
}
