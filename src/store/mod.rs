//! Bounded cache of finalized results.
//!
//! Entries are evicted in completion order (FIFO), never by access
//! recency. Every inserted result is also written to a [`ResultSink`];
//! a failed write is logged and does not affect the cache. The ids of
//! results without a durable record are remembered after eviction, so a
//! finalized job is never mistaken for a new one.

pub mod sink;

pub use sink::{FsResultSink, ResultSink};

use crate::models::FinalizedResult;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Default number of finalized results kept in memory.
pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, Arc<FinalizedResult>>,
    /// Completion order, oldest first.
    order: VecDeque<String>,
    /// Finalized ids whose durable write has not succeeded.
    unpersisted: HashSet<String>,
}

pub struct ResultStore {
    capacity: usize,
    inner: Mutex<CacheInner>,
    sink: Box<dyn ResultSink>,
}

impl ResultStore {
    pub fn new(capacity: usize, sink: Box<dyn ResultSink>) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
            sink,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a finalized result and write it durably. Returns the id of
    /// the job evicted to stay within capacity, if any.
    pub fn put(&self, result: Arc<FinalizedResult>) -> Option<String> {
        let job_id = result.job_id.clone();

        let evicted = {
            let mut inner = self.lock();
            if inner
                .entries
                .insert(job_id.clone(), Arc::clone(&result))
                .is_none()
            {
                inner.order.push_back(job_id.clone());
            }
            inner.unpersisted.insert(job_id.clone());

            let mut evicted = None;
            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                    debug!("Evicted finalized job {} from cache", oldest);
                    evicted = Some(oldest);
                }
            }
            evicted
        };

        match self.sink.persist(&result) {
            Ok(()) => {
                self.lock().unpersisted.remove(&job_id);
            }
            Err(e) => warn!("Failed to persist result for job {}: {}", job_id, e),
        }

        evicted
    }

    /// Cache lookup only; evicted and never-finalized jobs both miss.
    pub fn get(&self, job_id: &str) -> Option<Arc<FinalizedResult>> {
        self.lock().entries.get(job_id).cloned()
    }

    /// Whether `job_id` was ever finalized, consulting durable storage on
    /// a cache miss.
    pub fn is_finalized(&self, job_id: &str) -> bool {
        {
            let inner = self.lock();
            if inner.entries.contains_key(job_id) || inner.unpersisted.contains(job_id) {
                return true;
            }
        }
        self.sink.contains(job_id)
    }

    /// Cached job ids, oldest completion first.
    pub fn job_ids(&self) -> Vec<String> {
        self.lock().order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }
}
