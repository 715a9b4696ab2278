//! Aggregation engine: routes partial results to live jobs and drives
//! the one-time transition to a finalized result.
//!
//! Live jobs sit in a sharded map, each behind its own mutex, so one
//! job's merges are serialized while other jobs proceed in parallel.
//! The caller whose merge completes a job keeps that job's lock while it
//! finalizes, caches the result, and removes the job from the live map.
//! Any other caller that reaches the same slot afterwards sees a
//! non-live state and does nothing.
//!
//! Lock order is slot mutex, then map shard. The map shard is never
//! held while a slot mutex is being acquired.

use super::job::{JobAggregate, MergeOutcome};
use crate::error::MalformedPartial;
use crate::models::{JobView, LiveSnapshot, PartialResult};
use crate::store::ResultStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle of a job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Live,
    Finalizing,
    Done,
    Expired,
}

struct SlotInner {
    state: JobState,
    aggregate: JobAggregate,
}

struct JobSlot {
    inner: Mutex<SlotInner>,
}

impl JobSlot {
    fn new(aggregate: JobAggregate) -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                state: JobState::Live,
                aggregate,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What `submit` did with a partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// This call completed the job and produced its result.
    Finalized,
    Duplicate,
    Inconsistent,
    /// The job is no longer live.
    AlreadyFinalized,
}

#[derive(Debug, Default)]
struct EngineStats {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    inconsistent: AtomicU64,
    rejected: AtomicU64,
    late: AtomicU64,
    finalized: AtomicU64,
    expired: AtomicU64,
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub duplicates: u64,
    pub inconsistent: u64,
    pub rejected: u64,
    pub late: u64,
    pub finalized: u64,
    pub expired: u64,
}

pub struct AggregationEngine {
    live: DashMap<String, Arc<JobSlot>>,
    store: ResultStore,
    stats: EngineStats,
}

impl AggregationEngine {
    pub fn new(store: ResultStore) -> Self {
        Self {
            live: DashMap::new(),
            store,
            stats: EngineStats::default(),
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Merge one delivered partial result.
    ///
    /// Safe to call concurrently from any number of consumers, for the
    /// same job or different ones. Exactly one call per job returns
    /// `SubmitOutcome::Finalized`.
    pub fn submit(&self, partial: PartialResult) -> Result<SubmitOutcome, MalformedPartial> {
        if let Err(e) = partial.validate() {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Rejected partial for job '{}' section {}: {}",
                partial.job_id, partial.section_id, e
            );
            return Err(e);
        }

        let Some(slot) = self.live_slot(&partial) else {
            return Ok(self.late(&partial));
        };

        let mut guard = slot.lock();
        if guard.state != JobState::Live {
            drop(guard);
            return Ok(self.late(&partial));
        }

        let job_id = partial.job_id.clone();
        let section_id = partial.section_id;

        let outcome = guard.aggregate.add_partial(partial);
        match outcome {
            MergeOutcome::Accepted => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Job {}: merged section {} ({}/{})",
                    job_id,
                    section_id,
                    guard.aggregate.received_sections(),
                    guard.aggregate.expected_sections()
                );
                Ok(SubmitOutcome::Accepted)
            }
            MergeOutcome::DuplicateIgnored => {
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!("Job {}: duplicate section {} ignored", job_id, section_id);
                Ok(SubmitOutcome::Duplicate)
            }
            MergeOutcome::Inconsistent { expected, reported } => {
                self.stats.inconsistent.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Job {}: section {} reports {} sections, expected {}; ignoring ({} so far)",
                    job_id,
                    section_id,
                    reported,
                    expected,
                    guard.aggregate.inconsistent_deliveries()
                );
                Ok(SubmitOutcome::Inconsistent)
            }
            MergeOutcome::AcceptedAndComplete => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                guard.state = JobState::Finalizing;

                let top_n = guard.aggregate.top_n();
                let result = Arc::new(guard.aggregate.finalize(top_n));

                // Cache before leaving the live map, so a new delivery
                // that finds no live slot also finds the result.
                if let Some(evicted) = self.store.put(Arc::clone(&result)) {
                    debug!("Cache full; evicted job {}", evicted);
                }
                self.live.remove_if(&job_id, |_, v| Arc::ptr_eq(v, &slot));
                guard.state = JobState::Done;
                drop(guard);

                self.stats.finalized.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Job {} finalized: {} sections, {} words",
                    job_id, result.total_sections, result.total_word_count
                );
                Ok(SubmitOutcome::Finalized)
            }
        }
    }

    /// Find or create the live slot for a partial's job. Returns `None`
    /// when the job has already been finalized.
    fn live_slot(&self, partial: &PartialResult) -> Option<Arc<JobSlot>> {
        match self.live.entry(partial.job_id.clone()) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                if self.store.is_finalized(&partial.job_id) {
                    return None;
                }
                let slot = Arc::new(JobSlot::new(JobAggregate::new(partial)));
                entry.insert(Arc::clone(&slot));
                debug!(
                    "Job {} opened: expecting {} sections, top {}",
                    partial.job_id, partial.total_sections, partial.top_n
                );
                Some(slot)
            }
        }
    }

    fn late(&self, partial: &PartialResult) -> SubmitOutcome {
        self.stats.late.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Job {} is no longer live; dropping section {}",
            partial.job_id, partial.section_id
        );
        SubmitOutcome::AlreadyFinalized
    }

    /// Look up a job. Finalized results come from the cache; a live job
    /// yields a snapshot ranked with `top_n`.
    pub fn get(&self, job_id: &str, top_n: usize) -> Option<JobView> {
        if let Some(result) = self.store.get(job_id) {
            return Some(JobView::Finalized(result));
        }

        let slot = self.live.get(job_id).map(|entry| Arc::clone(entry.value()))?;
        let guard = slot.lock();
        let state = guard.state;
        match state {
            JobState::Live => {
                let aggregate = &guard.aggregate;
                Some(JobView::InProgress(LiveSnapshot {
                    received_sections: aggregate.received_sections(),
                    expected_sections: aggregate.expected_sections(),
                    result: aggregate.finalize(top_n),
                }))
            }
            // Finalized while we waited for the lock.
            JobState::Finalizing | JobState::Done => {
                drop(guard);
                self.store.get(job_id).map(JobView::Finalized)
            }
            JobState::Expired => None,
        }
    }

    /// Drop live jobs that have not merged a section within `max_idle`.
    /// Returns the expired job ids.
    pub fn expire_idle(&self, max_idle: Duration) -> Vec<String> {
        let now = Instant::now();
        let candidates: Vec<(String, Arc<JobSlot>)> = self
            .live
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut expired = Vec::new();
        for (job_id, slot) in candidates {
            let mut guard = slot.lock();
            if guard.state != JobState::Live
                || now.saturating_duration_since(guard.aggregate.last_update()) < max_idle
            {
                continue;
            }
            guard.state = JobState::Expired;
            self.live.remove_if(&job_id, |_, v| Arc::ptr_eq(v, &slot));
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Job {} expired after {:?} idle with {}/{} sections",
                job_id,
                max_idle,
                guard.aggregate.received_sections(),
                guard.aggregate.expected_sections()
            );
            expired.push(job_id);
        }
        expired
    }

    /// Ids of jobs still accumulating sections, sorted.
    pub fn live_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.live.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Ids of cached finalized jobs, oldest completion first.
    pub fn cached_jobs(&self) -> Vec<String> {
        self.store.job_ids()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            accepted: load(&self.stats.accepted),
            duplicates: load(&self.stats.duplicates),
            inconsistent: load(&self.stats.inconsistent),
            rejected: load(&self.stats.rejected),
            late: load(&self.stats.late),
            finalized: load(&self.stats.finalized),
            expired: load(&self.stats.expired),
        }
    }
}
