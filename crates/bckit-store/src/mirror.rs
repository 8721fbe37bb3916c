//! Mirror URLs: `s3://bucket/ref[/stack]`, `file:///path`, or a bare path.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::error::{MirrorUrlError, StoreError, StoreResult};
use crate::fs::FsStore;
use crate::s3::{S3Options, S3Store};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorLocation {
    S3 { bucket: String },
    Fs { root: PathBuf },
}

/// A parsed mirror URL: where the store lives and the key prefix of the mirror in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorUrl {
    raw: String,
    location: MirrorLocation,
    prefix: String,
}

impl MirrorUrl {
    pub fn parse(raw: &str) -> Result<Self, MirrorUrlError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MirrorUrlError::Empty);
        }
        if !trimmed.contains("://") {
            return Ok(Self::local(trimmed, absolutize(PathBuf::from(trimmed))));
        }
        let url = Url::parse(trimmed).map_err(|err| MirrorUrlError::Invalid {
            url: trimmed.to_string(),
            reason: err.to_string(),
        })?;
        match url.scheme() {
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| MirrorUrlError::MissingBucket {
                        url: trimmed.to_string(),
                    })?;
                Ok(Self {
                    raw: trimmed.trim_end_matches('/').to_string(),
                    location: MirrorLocation::S3 {
                        bucket: bucket.to_string(),
                    },
                    prefix: url.path().trim_matches('/').to_string(),
                })
            }
            "file" => {
                let root = url.to_file_path().map_err(|()| MirrorUrlError::Invalid {
                    url: trimmed.to_string(),
                    reason: "not a local path".to_string(),
                })?;
                Ok(Self::local(trimmed, root))
            }
            scheme => Err(MirrorUrlError::Unsupported {
                scheme: scheme.to_string(),
            }),
        }
    }

    fn local(raw: &str, root: PathBuf) -> Self {
        Self {
            raw: raw.trim_end_matches('/').to_string(),
            location: MirrorLocation::Fs { root },
            prefix: String::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn location(&self) -> &MirrorLocation {
        &self.location
    }

    /// Key prefix of the mirror inside its store (no leading or trailing slash).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn open(&self, options: &S3Options) -> StoreResult<Arc<dyn Store>> {
        match &self.location {
            MirrorLocation::S3 { bucket } => Ok(Arc::new(S3Store::new(bucket, options)?)),
            MirrorLocation::Fs { root } => {
                if !root.is_dir() {
                    return Err(StoreError::io(
                        root,
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "mirror directory does not exist",
                        ),
                    ));
                }
                Ok(Arc::new(FsStore::new(root.clone())))
            }
        }
    }
}

impl fmt::Display for MirrorUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path,
        }
    }
}
