//! Parallel batched deletion.

use serde::Serialize;
use tracing::{debug, warn};

use crate::pool::WorkerPool;
use crate::store::Store;

/// A key the backend refused to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub requested: usize,
    pub deleted: usize,
    /// Whole batches that failed.
    pub errors: Vec<String>,
    /// Individual keys that failed.
    pub failures: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.failures.is_empty()
    }
}

/// Delete `keys` with `parallelism` workers, each owning a round-robin slice of
/// the keys and deleting it in batches of at most `batch_size` (capped by the
/// backend). Failures are reported, not retried.
pub fn delete_objects(
    store: &dyn Store,
    keys: &[String],
    parallelism: usize,
    batch_size: usize,
) -> DeleteReport {
    let mut report = DeleteReport {
        requested: keys.len(),
        ..DeleteReport::default()
    };
    if keys.is_empty() {
        return report;
    }
    let workers = parallelism.clamp(1, keys.len());
    let batch_size = batch_size.clamp(1, store.max_batch_size().max(1));
    let slices: Vec<Vec<String>> = (0..workers)
        .map(|worker| {
            keys.iter()
                .skip(worker)
                .step_by(workers)
                .cloned()
                .collect()
        })
        .collect();

    let pool = match WorkerPool::new(workers) {
        Ok(pool) => pool,
        Err(err) => {
            report.errors.push(format!("failed to start delete workers: {err}"));
            return report;
        }
    };
    pool.run(
        slices,
        |slice| {
            let mut partial = DeleteReport::default();
            for batch in slice.chunks(batch_size) {
                match store.delete_batch(batch) {
                    Ok(failures) => {
                        partial.deleted += batch.len() - failures.len();
                        partial.failures.extend(failures);
                    }
                    Err(err) => {
                        warn!(keys = batch.len(), error = %err, "delete batch failed");
                        partial.errors.push(err.to_string());
                    }
                }
            }
            partial
        },
        |partial| {
            report.deleted += partial.deleted;
            report.errors.extend(partial.errors);
            report.failures.extend(partial.failures);
        },
    );
    debug!(
        requested = report.requested,
        deleted = report.deleted,
        failures = report.failures.len(),
        "delete finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::store::ObjectIter;
    use bckit_domain::StoreObject;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl Store for RecordingStore {
        fn id(&self) -> &str {
            "mem://test"
        }
        fn list(&self, _prefix: &str) -> StoreResult<ObjectIter<'_>> {
            Ok(Box::new(std::iter::empty()))
        }
        fn get(&self, key: &str) -> StoreResult<Bytes> {
            Err(StoreError::NotFound { key: key.into() })
        }
        fn head(&self, _key: &str) -> StoreResult<Option<StoreObject>> {
            Ok(None)
        }
        fn put(&self, _key: &str, _data: Bytes) -> StoreResult<()> {
            Ok(())
        }
        fn copy(&self, _from: &str, _to: &str, _size: u64) -> StoreResult<()> {
            Ok(())
        }
        fn delete_batch(&self, keys: &[String]) -> StoreResult<Vec<DeleteFailure>> {
            self.batches.lock().unwrap().push(keys.to_vec());
            Ok(keys
                .iter()
                .filter(|key| key.starts_with("locked/"))
                .map(|key| DeleteFailure {
                    key: key.clone(),
                    message: "access denied".into(),
                })
                .collect())
        }
        fn max_batch_size(&self) -> usize {
            3
        }
    }

    #[test]
    fn batches_are_capped_and_slices_are_disjoint() {
        let store = RecordingStore::default();
        let mut keys: Vec<String> = (0..10).map(|n| format!("k{n}")).collect();
        keys.push("locked/x".into());

        let report = delete_objects(&store, &keys, 2, 100);
        assert_eq!(report.requested, 11);
        assert_eq!(report.deleted, 10);
        assert!(report.errors.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "locked/x");

        let batches = store.batches.lock().unwrap();
        assert!(batches.iter().all(|batch| batch.len() <= 3));
        let mut seen: Vec<String> = batches.iter().flatten().cloned().collect();
        seen.sort();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn empty_input_does_nothing() {
        let store = RecordingStore::default();
        let report = delete_objects(&store, &[], 4, 10);
        assert!(report.is_clean());
        assert_eq!(report.deleted, 0);
        assert!(store.batches.lock().unwrap().is_empty());
    }
}
