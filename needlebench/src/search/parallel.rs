use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use super::{candidate_count, check_pattern, matches_at, Parallelism, SearchStrategy};
use crate::errors::{BenchError, BenchResult};

// Smallest run of candidates a worker takes at once; keeps task overhead
// below the cost of the comparisons on short haystacks.
const MIN_PARTITION_LEN: usize = 4096;

/// Splits the candidate range over a dedicated pool of `k` Rayon threads.
///
/// Each instance owns its pool so that a `k`-thread measurement never borrows
/// threads from the global pool or from another rung.
#[derive(Debug)]
pub struct ParallelScanner {
    name: String,
    workers: NonZeroUsize,
    pool: Option<ThreadPool>,
}

impl ParallelScanner {
    /// Builds a scanner backed by a new pool of exactly `workers` threads
    pub fn new(workers: NonZeroUsize) -> BenchResult<Self> {
        let k = workers.get();
        let pool = ThreadPoolBuilder::new()
            .num_threads(k)
            .thread_name(move |i| format!("needlebench-{}x-{}", k, i))
            .build()
            .map_err(|e| BenchError::ThreadPool(e.to_string()))?;

        debug!("Created {}-thread search pool", k);

        Ok(Self {
            name: format!("ParallelCPU-{}Threads", k),
            workers,
            pool: Some(pool),
        })
    }

    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    /// Threads actually running in the pool, or `None` once released
    pub fn pool_size(&self) -> Option<usize> {
        self.pool.as_ref().map(|p| p.current_num_threads())
    }

    /// Runs `job` inside the pool, turning a worker panic into an execution fault
    fn execute<F>(&self, job: F) -> BenchResult<u64>
    where
        F: FnOnce() -> usize + Send,
    {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| BenchError::released(&self.name))?;

        match panic::catch_unwind(AssertUnwindSafe(|| pool.install(job))) {
            Ok(count) => Ok(count as u64),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                warn!(
                    "{} failed to execute search, reporting 0 occurrences: {}",
                    self.name, reason
                );
                Err(BenchError::execution_fault(&self.name, reason))
            }
        }
    }
}

impl SearchStrategy for ParallelScanner {
    fn search(&self, haystack: &[u8], pattern: &[u8]) -> BenchResult<u64> {
        check_pattern(pattern)?;
        let candidates = candidate_count(haystack.len(), pattern.len());
        self.execute(|| {
            (0..candidates)
                .into_par_iter()
                .with_min_len(MIN_PARTITION_LEN)
                .filter(|&start| matches_at(haystack, pattern, start))
                .count()
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parallelism(&self) -> Parallelism {
        Parallelism::Threads(self.workers.get())
    }

    fn release(&mut self) -> BenchResult<()> {
        match self.pool.take() {
            // Dropping the pool signals its threads to exit once idle
            Some(pool) => {
                drop(pool);
                debug!("Shut down pool for {}", self.name);
                Ok(())
            }
            None => Err(BenchError::released(&self.name)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
