//! Outward reporting of job execution.
//!
//! [`IndexListener`] receives job start/finish events and leveled messages,
//! optionally scoped to a job and carrying the causing error.
//! [`TracingListener`] forwards everything to `tracing`.

use std::error::Error;

use tracing::{debug, error, info, warn};

use crate::job::IndexJob;

/// Severity of a listener message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Receives scheduler events.
pub trait IndexListener: Send + Sync {
    /// A worker claimed the job and is about to run it.
    fn start_job(&self, job: &IndexJob);

    /// The job reached its terminal state.
    fn finish_job(&self, job: &IndexJob);

    fn message(
        &self,
        level: Level,
        job: Option<&IndexJob>,
        message: &str,
        cause: Option<&(dyn Error + 'static)>,
    );

    fn debug(&self, job: Option<&IndexJob>, message: &str) {
        self.message(Level::Debug, job, message, None);
    }

    fn info(&self, job: Option<&IndexJob>, message: &str) {
        self.message(Level::Info, job, message, None);
    }

    fn warn(&self, job: Option<&IndexJob>, message: &str, cause: Option<&(dyn Error + 'static)>) {
        self.message(Level::Warn, job, message, cause);
    }

    fn error(&self, job: Option<&IndexJob>, message: &str, cause: Option<&(dyn Error + 'static)>) {
        self.message(Level::Error, job, message, cause);
    }
}

/// Listener logging every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl IndexListener for TracingListener {
    fn start_job(&self, job: &IndexJob) {
        info!(
            job_id = %job.id(),
            index = %job.index_id(),
            content = %job.describe(),
            requester = %job.requester(),
            priority = %job.priority(),
            "Job started"
        );
    }

    fn finish_job(&self, job: &IndexJob) {
        info!(
            job_id = %job.id(),
            index = %job.index_id(),
            requester = %job.requester(),
            state = %job.state(),
            "Job finished"
        );
    }

    fn message(
        &self,
        level: Level,
        job: Option<&IndexJob>,
        message: &str,
        cause: Option<&(dyn Error + 'static)>,
    ) {
        let job_id = job.map(|j| j.id()).unwrap_or("-");
        let index = job.map(|j| j.index_id()).unwrap_or("-");
        let requester = job.map(|j| j.requester().requester_id()).unwrap_or("-");
        let cause = cause.map(|e| e.to_string());
        let cause = cause.as_deref();

        match level {
            Level::Debug => debug!(job_id, index, requester, error = cause, "{}", message),
            Level::Info => info!(job_id, index, requester, error = cause, "{}", message),
            Level::Warn => warn!(job_id, index, requester, error = cause, "{}", message),
            Level::Error => error!(job_id, index, requester, error = cause, "{}", message),
        }
    }
}
