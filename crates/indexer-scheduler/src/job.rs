//! Index jobs and their lifecycle.
//!
//! A job is one mutation (add/update/delete of a piece of content, or a
//! whole-index clear) against one index. Its state moves
//! `Pending -> Running -> {Succeeded, Failed}` exactly once: [`IndexJob::claim`]
//! is the only way out of `Pending` and hands back a [`JobTicket`], and only
//! the ticket can reach a terminal state.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use indexer_pipeline::IndexConfig;
use indexer_search::IndexEngine;
use indexer_types::{ContentId, Priority, Requester};

/// What a job does to its index.
#[derive(Debug, Clone)]
pub enum JobKind {
    /// Add, update or delete one piece of content
    Mutate {
        content_id: ContentId,
        config: Option<IndexConfig>,
    },
    /// Drop every document of the index
    ClearIndex,
}

/// Execution state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum JobState {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Pending,
            1 => JobState::Running,
            2 => JobState::Succeeded,
            _ => JobState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One scheduled mutation against one index.
pub struct IndexJob {
    id: String,
    kind: JobKind,
    priority: Priority,
    index: Arc<dyn IndexEngine>,
    requester: Requester,
    parameters: HashMap<String, String>,
    submitted_at: DateTime<Utc>,
    state: AtomicU8,
    finished: Notify,
}

impl IndexJob {
    /// Job adding, updating or deleting one piece of content.
    pub fn new_job(
        content_id: ContentId,
        config: Option<IndexConfig>,
        priority: Priority,
        index: Arc<dyn IndexEngine>,
        requester: Requester,
        parameters: HashMap<String, String>,
    ) -> Self {
        Self::build(
            JobKind::Mutate { content_id, config },
            priority,
            index,
            requester,
            parameters,
        )
    }

    /// Job dropping every document of `index`.
    pub fn new_clear_job(priority: Priority, index: Arc<dyn IndexEngine>, requester: Requester) -> Self {
        Self::build(JobKind::ClearIndex, priority, index, requester, HashMap::new())
    }

    fn build(
        kind: JobKind,
        priority: Priority,
        index: Arc<dyn IndexEngine>,
        requester: Requester,
        parameters: HashMap<String, String>,
    ) -> Self {
        let submitted_at = Utc::now();
        let id = derive_job_id(submitted_at, &kind, index.index_id(), &requester, priority);
        Self {
            id,
            kind,
            priority,
            index,
            requester,
            parameters,
            submitted_at,
            state: AtomicU8::new(JobState::Pending as u8),
            finished: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    /// Content the job mutates; `None` for clear jobs.
    pub fn content_id(&self) -> Option<&ContentId> {
        match &self.kind {
            JobKind::Mutate { content_id, .. } => Some(content_id),
            JobKind::ClearIndex => None,
        }
    }

    pub fn config(&self) -> Option<&IndexConfig> {
        match &self.kind {
            JobKind::Mutate { config, .. } => config.as_ref(),
            JobKind::ClearIndex => None,
        }
    }

    pub fn is_clear_job(&self) -> bool {
        matches!(self.kind, JobKind::ClearIndex)
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Target index handle
    pub fn index(&self) -> &Arc<dyn IndexEngine> {
        &self.index
    }

    pub fn index_id(&self) -> &str {
        self.index.index_id()
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn is_for_requester(&self, requester: &Requester) -> bool {
        self.requester == *requester
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether the job finished successfully. `false` while not finished.
    pub fn is_success(&self) -> bool {
        self.state() == JobState::Succeeded
    }

    /// Move the job from `Pending` to `Running`.
    ///
    /// Returns `None` if the job was already claimed.
    pub fn claim(self: &Arc<Self>) -> Option<JobTicket> {
        self.state
            .compare_exchange(
                JobState::Pending as u8,
                JobState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .ok()
            .map(|_| JobTicket {
                job: Arc::clone(self),
            })
    }

    fn complete(&self, success: bool) -> bool {
        let terminal = if success {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        let done = self
            .state
            .compare_exchange(
                JobState::Running as u8,
                terminal as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if done {
            self.finished.notify_waiters();
        }
        done
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait_finished(&self) -> JobState {
        loop {
            let notified = self.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let state = self.state();
            if state.is_terminal() {
                return state;
            }
            notified.await;
        }
    }

    /// Same pending work as `other`: index, content, config, parameters
    /// and priority all match.
    pub fn is_duplicate_of(&self, other: &IndexJob) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (
                JobKind::Mutate {
                    content_id: a,
                    config: config_a,
                },
                JobKind::Mutate {
                    content_id: b,
                    config: config_b,
                },
            ) => a == b && config_a.as_ref().map(|c| c.id()) == config_b.as_ref().map(|c| c.id()),
            (JobKind::ClearIndex, JobKind::ClearIndex) => true,
            _ => false,
        };

        same_kind
            && self.priority == other.priority
            && self.index_id() == other.index_id()
            && self.parameters == other.parameters
    }

    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match &self.kind {
            JobKind::Mutate { content_id, .. } => format!("{} -> {}", content_id, self.index_id()),
            JobKind::ClearIndex => format!("clear {}", self.index_id()),
        }
    }
}

/// Jobs compare by priority only; equal priorities are order-equivalent.
impl PartialEq for IndexJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl PartialOrd for IndexJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.priority.cmp(&other.priority))
    }
}

impl std::fmt::Debug for IndexJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexJob")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("index", &self.index_id())
            .field("requester", &self.requester)
            .field("state", &self.state())
            .finish()
    }
}

fn derive_job_id(
    submitted_at: DateTime<Utc>,
    kind: &JobKind,
    index_id: &str,
    requester: &Requester,
    priority: Priority,
) -> String {
    let mut hasher = DefaultHasher::new();
    submitted_at.hash(&mut hasher);
    match kind {
        JobKind::Mutate { content_id, config } => {
            content_id.hash(&mut hasher);
            config.as_ref().map(|c| c.id()).hash(&mut hasher);
        }
        JobKind::ClearIndex => "clear".hash(&mut hasher),
    }
    index_id.hash(&mut hasher);
    requester.hash(&mut hasher);
    priority.hash(&mut hasher);

    format!(
        "{}-{:016x}",
        submitted_at.format("%Y%m%d%H%M%S%3f"),
        hasher.finish()
    )
}

/// Exclusive right to finish a running job.
///
/// Dropping a ticket without calling [`JobTicket::finish`] fails the job.
pub struct JobTicket {
    job: Arc<IndexJob>,
}

impl JobTicket {
    pub fn job(&self) -> &Arc<IndexJob> {
        &self.job
    }

    /// Record the outcome and return the terminal state.
    pub fn finish(self, success: bool) -> JobState {
        self.job.complete(success);
        self.job.state()
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        self.job.complete(false);
    }
}

impl std::fmt::Debug for JobTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTicket").field("job", &self.job.id).finish()
    }
}
