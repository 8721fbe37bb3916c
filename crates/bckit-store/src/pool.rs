//! Bounded worker pool with completion-order result delivery.

use std::sync::mpsc;

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    jobs: usize,
}

impl WorkerPool {
    pub fn new(jobs: usize) -> Result<Self, ThreadPoolBuildError> {
        let jobs = jobs.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|index| format!("bckit-worker-{index}"))
            .build()?;
        Ok(Self { pool, jobs })
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Run `task` for every item on the pool; `on_result` sees each result on the
    /// calling thread as soon as it completes.
    ///
    /// Must not be called from inside [`WorkerPool::install`].
    pub fn run<I, T, R, F, C>(&self, items: I, task: F, mut on_result: C)
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
        C: FnMut(R),
    {
        let (tx, rx) = mpsc::channel();
        let task = &task;
        self.pool.in_place_scope(|scope| {
            for item in items {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // The receiver outlives the scope, so a failed send cannot happen.
                    let _ = tx.send(task(item));
                });
            }
            drop(tx);
            for result in rx {
                on_result(result);
            }
        });
    }

    /// Like [`WorkerPool::run`], collecting results in completion order.
    pub fn map<I, T, R, F>(&self, items: I, task: F) -> Vec<R>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        let mut results = Vec::new();
        self.run(items, task, |result| results.push(result));
        results
    }

    /// Run `op` with this pool as the current rayon pool (for `par_iter` users).
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_every_item_once() {
        let pool = WorkerPool::new(4).unwrap();
        let calls = AtomicUsize::new(0);
        let mut results = pool.map(0..100, |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            n * 2
        });
        results.sort_unstable();
        assert_eq!(calls.load(Ordering::SeqCst), 100);
        assert_eq!(results, (0..100).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn results_arrive_in_completion_order() {
        let pool = WorkerPool::new(2).unwrap();
        let results = pool.map([200u64, 0], |delay| {
            std::thread::sleep(Duration::from_millis(delay));
            delay
        });
        assert_eq!(results, vec![0, 200]);
    }

    #[test]
    fn zero_jobs_means_one_worker() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.jobs(), 1);
        assert_eq!(pool.map(vec!["a"], str::len), vec![1]);
    }
}
