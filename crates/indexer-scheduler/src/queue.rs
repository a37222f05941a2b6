//! Pending job queue.
//!
//! Two FIFO tiers drained HIGH first. Claiming scans in that order and
//! takes the first job whose index can be locked, so a busy index never
//! holds back jobs for other indexes, and jobs for the same index leave
//! the queue in priority-then-arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use indexer_types::Priority;

use crate::job::IndexJob;

struct Entry {
    seq: u64,
    job: Arc<IndexJob>,
}

/// Result of [`JobQueue::push`].
#[derive(Debug)]
pub enum Enqueued {
    /// The job was queued
    Queued(Arc<IndexJob>),
    /// Equal work was already pending; the existing job is returned
    Duplicate(Arc<IndexJob>),
}

impl Enqueued {
    pub fn job(&self) -> &Arc<IndexJob> {
        match self {
            Enqueued::Queued(job) | Enqueued::Duplicate(job) => job,
        }
    }

    pub fn into_job(self) -> Arc<IndexJob> {
        match self {
            Enqueued::Queued(job) | Enqueued::Duplicate(job) => job,
        }
    }
}

/// Priority queue with FIFO order inside each tier.
#[derive(Default)]
pub struct JobQueue {
    high: VecDeque<Entry>,
    low: VecDeque<Entry>,
    next_seq: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier_mut(&mut self, priority: Priority) -> &mut VecDeque<Entry> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Low => &mut self.low,
        }
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.high.iter().chain(self.low.iter())
    }

    /// Most recently submitted pending job for an index.
    fn latest_for_index(&self, index_id: &str) -> Option<&Arc<IndexJob>> {
        self.entries()
            .filter(|e| e.job.index_id() == index_id)
            .max_by_key(|e| e.seq)
            .map(|e| &e.job)
    }

    /// Queue a job.
    ///
    /// If the latest pending job for the same index is equal work, nothing
    /// is queued and that job is returned instead.
    pub fn push(&mut self, job: Arc<IndexJob>) -> Enqueued {
        if let Some(existing) = self.latest_for_index(job.index_id()) {
            if existing.is_duplicate_of(&job) {
                return Enqueued::Duplicate(Arc::clone(existing));
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let priority = job.priority();
        self.tier_mut(priority).push_back(Entry {
            seq,
            job: Arc::clone(&job),
        });
        Enqueued::Queued(job)
    }

    /// Remove and return the first job `try_lock` accepts.
    ///
    /// `try_lock` is asked for jobs in HIGH-then-LOW, oldest-first order and
    /// returns a value (typically an index permit) to claim the job.
    pub fn claim_next<P, F>(&mut self, mut try_lock: F) -> Option<(Arc<IndexJob>, P)>
    where
        F: FnMut(&IndexJob) -> Option<P>,
    {
        for priority in [Priority::High, Priority::Low] {
            let tier = self.tier_mut(priority);
            let mut found = None;
            for (pos, entry) in tier.iter().enumerate() {
                if let Some(permit) = try_lock(&entry.job) {
                    found = Some((pos, permit));
                    break;
                }
            }
            if let Some((pos, permit)) = found {
                if let Some(entry) = tier.remove(pos) {
                    return Some((entry.job, permit));
                }
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty()
    }

    pub fn len_for(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high.len(),
            Priority::Low => self.low.len(),
        }
    }

    /// Pending jobs matching a predicate, in claim order.
    pub fn matching<F>(&self, mut predicate: F) -> Vec<Arc<IndexJob>>
    where
        F: FnMut(&IndexJob) -> bool,
    {
        self.entries()
            .filter(|e| predicate(&e.job))
            .map(|e| Arc::clone(&e.job))
            .collect()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("high", &self.high.len())
            .field("low", &self.low.len())
            .finish()
    }
}
