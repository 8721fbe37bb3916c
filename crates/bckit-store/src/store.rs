use bckit_domain::StoreObject;
use bytes::Bytes;

use crate::delete::DeleteFailure;
use crate::error::StoreResult;

/// Lazy listing; calling [`Store::list`] again restarts from the beginning.
pub type ObjectIter<'a> = Box<dyn Iterator<Item = StoreResult<StoreObject>> + Send + 'a>;

/// The operations the engine needs from an object store.
pub trait Store: Send + Sync {
    /// Stable identifier, e.g. `s3://bucket` or `file:///srv/mirror`.
    fn id(&self) -> &str;

    fn list(&self, prefix: &str) -> StoreResult<ObjectIter<'_>>;

    fn get(&self, key: &str) -> StoreResult<Bytes>;

    /// `None` when the key does not exist.
    fn head(&self, key: &str) -> StoreResult<Option<StoreObject>>;

    fn put(&self, key: &str, data: Bytes) -> StoreResult<()>;

    /// Server-side copy. `size` selects the transfer strategy.
    fn copy(&self, from: &str, to: &str, size: u64) -> StoreResult<()>;

    /// Delete up to [`Store::max_batch_size`] keys, returning per-key failures.
    fn delete_batch(&self, keys: &[String]) -> StoreResult<Vec<DeleteFailure>>;

    fn max_batch_size(&self) -> usize;
}
