//! S3-compatible store driven through `object_store` on a private runtime.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bckit_domain::StoreObject;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    BackoffConfig, ClientOptions, ObjectMeta, ObjectStore, PutPayload, RetryConfig, WriteMultipart,
};
use time::OffsetDateTime;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::delete::DeleteFailure;
use crate::error::{StoreError, StoreResult};
use crate::store::{ObjectIter, Store};

const MAX_BATCH_SIZE: usize = 1000;
const MULTIPART_CONCURRENCY: usize = 8;
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024 * 1024;

/// Client settings for [`S3Store`].
#[derive(Debug, Clone)]
pub struct S3Options {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Copies larger than this are streamed in parts instead of copied server-side.
    pub multipart_threshold: u64,
    pub request_timeout: Duration,
    pub max_retries: usize,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: None,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            request_timeout: Duration::from_secs(60),
            max_retries: 10,
        }
    }
}

pub struct S3Store {
    id: String,
    inner: Arc<dyn ObjectStore>,
    runtime: Runtime,
    multipart_threshold: u64,
}

impl S3Store {
    pub fn new(bucket: &str, options: &S3Options) -> StoreResult<Self> {
        let retry = RetryConfig {
            backoff: BackoffConfig {
                init_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(30),
                base: 2.0,
            },
            max_retries: options.max_retries,
            retry_timeout: Duration::from_secs(300),
        };
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_retry(retry)
            .with_client_options(ClientOptions::new().with_timeout(options.request_timeout));
        if let Some(endpoint) = &options.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"))
                .with_virtual_hosted_style_request(false);
        }
        if let Some(region) = &options.region {
            builder = builder.with_region(region);
        }
        let id = format!("s3://{bucket}");
        let inner = builder
            .build()
            .map_err(|err| StoreError::from_object_store(err, &id))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(StoreError::Runtime)?;
        Ok(Self {
            id,
            inner: Arc::new(inner),
            runtime,
            multipart_threshold: options.multipart_threshold,
        })
    }

    fn object(&self, meta: &ObjectMeta) -> StoreObject {
        let modified = OffsetDateTime::from_unix_timestamp(meta.last_modified.timestamp())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        StoreObject::new(
            &self.id,
            meta.location.to_string(),
            meta.size as u64,
            modified,
        )
    }

    async fn streaming_copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        let mut source = self.inner.get(from).await?.into_stream();
        let upload = self.inner.put_multipart(to).await?;
        let mut writer = WriteMultipart::new(upload);
        while let Some(chunk) = source.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    writer.abort().await?;
                    return Err(err);
                }
            };
            writer.wait_for_capacity(MULTIPART_CONCURRENCY).await?;
            writer.write(&chunk);
        }
        writer.finish().await?;
        Ok(())
    }
}

struct S3Listing<'a> {
    store: &'a S3Store,
    stream: BoxStream<'a, object_store::Result<ObjectMeta>>,
}

impl Iterator for S3Listing<'_> {
    type Item = StoreResult<StoreObject>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.store.runtime.block_on(self.stream.next())?;
        Some(
            next.map(|meta| self.store.object(&meta))
                .map_err(|err| StoreError::from_object_store(err, &self.store.id)),
        )
    }
}

/// Keys missing from `deleted`, each paired with the error that names it.
fn unconfirmed_deletes(
    keys: &[String],
    deleted: &HashSet<String>,
    errors: &[object_store::Error],
) -> Vec<DeleteFailure> {
    let attributed: Vec<(String, String)> = errors
        .iter()
        .filter_map(|err| {
            let path = match err {
                object_store::Error::NotFound { path, .. }
                | object_store::Error::AlreadyExists { path, .. }
                | object_store::Error::Precondition { path, .. }
                | object_store::Error::NotModified { path, .. } => Some(path.clone()),
                other => {
                    let text = other.to_string();
                    keys.iter()
                        .map(|key| key.trim_matches('/'))
                        .find(|key| text.contains(*key))
                        .map(ToOwned::to_owned)
                }
            }?;
            Some((path.trim_matches('/').to_string(), err.to_string()))
        })
        .collect();
    keys.iter()
        .filter(|key| !deleted.contains(key.trim_matches('/')))
        .map(|key| {
            let message = attributed
                .iter()
                .find(|(path, _)| path == key.trim_matches('/'))
                .map_or_else(|| "delete not confirmed".to_string(), |(_, message)| message.clone());
            DeleteFailure {
                key: key.clone(),
                message,
            }
        })
        .collect()
}

fn object_path(key: &str) -> ObjectPath {
    ObjectPath::from(key.trim_matches('/'))
}

impl Store for S3Store {
    fn id(&self) -> &str {
        &self.id
    }

    fn list(&self, prefix: &str) -> StoreResult<ObjectIter<'_>> {
        let prefix = prefix.trim_matches('/');
        let prefix = (!prefix.is_empty()).then(|| ObjectPath::from(prefix));
        let stream = self.inner.list(prefix.as_ref());
        Ok(Box::new(S3Listing {
            store: self,
            stream,
        }))
    }

    fn get(&self, key: &str) -> StoreResult<Bytes> {
        let path = object_path(key);
        self.runtime
            .block_on(async { self.inner.get(&path).await?.bytes().await })
            .map_err(|err| StoreError::from_object_store(err, key))
    }

    fn head(&self, key: &str) -> StoreResult<Option<StoreObject>> {
        let path = object_path(key);
        match self.runtime.block_on(self.inner.head(&path)) {
            Ok(meta) => Ok(Some(self.object(&meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(StoreError::from_object_store(err, key)),
        }
    }

    fn put(&self, key: &str, data: Bytes) -> StoreResult<()> {
        let path = object_path(key);
        self.runtime
            .block_on(self.inner.put(&path, PutPayload::from_bytes(data)))
            .map(|_| ())
            .map_err(|err| StoreError::from_object_store(err, key))
    }

    fn copy(&self, from: &str, to: &str, size: u64) -> StoreResult<()> {
        let source = object_path(from);
        let dest = object_path(to);
        let result = if size > self.multipart_threshold {
            debug!(from, to, size, "streaming multipart copy");
            self.runtime.block_on(self.streaming_copy(&source, &dest))
        } else {
            self.runtime.block_on(self.inner.copy(&source, &dest))
        };
        result.map_err(|err| StoreError::from_object_store(err, from))
    }

    fn delete_batch(&self, keys: &[String]) -> StoreResult<Vec<DeleteFailure>> {
        let paths: Vec<object_store::Result<ObjectPath>> =
            keys.iter().map(|key| Ok(object_path(key))).collect();
        let (deleted, errors) = self.runtime.block_on(async {
            let mut results = self
                .inner
                .delete_stream(stream::iter(paths).boxed());
            let mut deleted = HashSet::new();
            let mut errors = Vec::new();
            while let Some(result) = results.next().await {
                match result {
                    Ok(path) => {
                        deleted.insert(path.to_string());
                    }
                    Err(err) => errors.push(err),
                }
            }
            (deleted, errors)
        });
        Ok(unconfirmed_deletes(keys, &deleted, &errors))
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }
}
