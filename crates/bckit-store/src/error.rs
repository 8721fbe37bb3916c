use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("object store error on {key}: {source}")]
    ObjectStore {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("mirror index not found at {key}")]
    IndexNotFound { key: String },

    #[error("mirror index {key} is malformed: {reason}")]
    IndexParseError { key: String, reason: String },

    #[error(transparent)]
    MirrorUrl(#[from] MirrorUrlError),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn from_object_store(err: object_store::Error, key: &str) -> Self {
        match err {
            object_store::Error::NotFound { .. } => Self::NotFound {
                key: key.to_string(),
            },
            source => Self::ObjectStore {
                key: key.to_string(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::IndexNotFound { .. })
    }
}

/// Problems with a mirror URL given on the command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MirrorUrlError {
    #[error("mirror URL is empty")]
    Empty,
    #[error("mirror URL '{url}' is invalid: {reason}")]
    Invalid { url: String, reason: String },
    #[error("mirror URL '{url}' has no bucket")]
    MissingBucket { url: String },
    #[error("unsupported mirror scheme '{scheme}' (expected s3 or file)")]
    Unsupported { scheme: String },
}
