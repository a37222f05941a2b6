//! Index job scheduling.
//!
//! Jobs (add/update/delete of content, or whole-index clears) are queued by
//! priority and executed by a pool of workers, with at most one job running
//! against any index at a time.
//!
//! - [`IndexJob`] with an explicit `Pending -> Running -> {Succeeded, Failed}` lifecycle
//! - [`JobQueue`]: two FIFO tiers drained HIGH first
//! - [`IndexLocks`]: keyed try-claim locks with RAII release
//! - [`IndexListener`]: outward job reporting, [`TracingListener`] by default
//! - [`IndexRegistry`]: per-index run statistics
//! - [`SchedulerService`]: the worker pool and status queries
//!
//! # Example
//!
//! ```ignore
//! use indexer_scheduler::{IndexJob, PipelineExecutor, SchedulerConfig, SchedulerService};
//!
//! let executor = Arc::new(PipelineExecutor::new(pipeline));
//! let scheduler = SchedulerService::new(SchedulerConfig::default(), executor)?;
//! scheduler.start().await?;
//!
//! let job = scheduler.submit(IndexJob::new_job(
//!     content_id,
//!     None,
//!     Priority::High,
//!     engine,
//!     Requester::new("cli"),
//!     HashMap::new(),
//! ));
//! job.wait_finished().await;
//! ```

mod config;
mod error;
mod executor;
mod job;
mod listener;
mod locks;
mod queue;
mod registry;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use executor::{JobExecutor, PipelineExecutor};
pub use job::{IndexJob, JobKind, JobState, JobTicket};
pub use listener::{IndexListener, Level, TracingListener};
pub use locks::{IndexLocks, IndexPermit};
pub use queue::{Enqueued, JobQueue};
pub use registry::{IndexRegistry, IndexStatus, JobResult};
pub use scheduler::SchedulerService;
