//! Worker pool draining the job queue.
//!
//! Workers are tokio tasks. Each one claims the highest-priority pending job
//! whose index is unlocked, runs it on the blocking pool and releases the
//! index when the job ends. Idle workers sleep until a job is queued or an
//! index is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use indexer_types::Requester;

use crate::executor::JobExecutor;
use crate::job::{IndexJob, JobTicket};
use crate::listener::{IndexListener, TracingListener};
use crate::locks::{IndexLocks, IndexPermit};
use crate::queue::{Enqueued, JobQueue};
use crate::registry::{IndexRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the service and its workers.
struct Shared {
    queue: Mutex<JobQueue>,
    running: Mutex<Vec<Arc<IndexJob>>>,
    locks: IndexLocks,
    wake: Arc<Notify>,
    idle: Notify,
    executor: Arc<dyn JobExecutor>,
    listener: Arc<dyn IndexListener>,
    registry: Arc<IndexRegistry>,
}

impl Shared {
    /// Claim the next runnable job, locking its index.
    fn claim_next(&self) -> Option<(JobTicket, IndexPermit)> {
        let mut queue = lock(&self.queue);
        loop {
            let (job, permit) = queue.claim_next(|job| self.locks.try_acquire(job.index_id()))?;
            match job.claim() {
                Some(ticket) => {
                    lock(&self.running).push(Arc::clone(&job));
                    return Some((ticket, permit));
                }
                None => warn!(job_id = %job.id(), "Queued job was already claimed, dropping it"),
            }
        }
    }

    fn is_idle(&self) -> bool {
        let queue = lock(&self.queue);
        queue.is_empty() && lock(&self.running).is_empty()
    }
}

async fn worker_loop(worker: usize, shared: Arc<Shared>, token: CancellationToken) {
    debug!(worker, "Worker started");
    loop {
        let notified = shared.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if token.is_cancelled() {
            break;
        }

        if let Some((ticket, permit)) = shared.claim_next() {
            run_job(worker, &shared, ticket, permit).await;
            continue;
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = &mut notified => {}
        }
    }
    debug!(worker, "Worker stopped");
}

async fn run_job(worker: usize, shared: &Arc<Shared>, ticket: JobTicket, permit: IndexPermit) {
    let job = Arc::clone(ticket.job());
    shared.registry.record_start(job.index_id(), job.id());
    shared.listener.start_job(&job);
    let started = Instant::now();

    let executor = Arc::clone(&shared.executor);
    let blocking_job = Arc::clone(&job);
    let result = tokio::task::spawn_blocking(move || executor.execute(&blocking_job)).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let job_result = match result {
        Ok(Ok(outcome)) => {
            shared
                .listener
                .info(Some(&job), &format!("{}: {}", job.describe(), outcome));
            JobResult::Success(outcome.to_string())
        }
        Ok(Err(e)) => {
            let message = format!("{} error while running {}", e.kind(), job.describe());
            shared.listener.error(Some(&job), &message, Some(&e));
            JobResult::Failed(e.to_string())
        }
        Err(e) => {
            shared
                .listener
                .error(Some(&job), "Job aborted by a panic", Some(&e));
            JobResult::Failed(e.to_string())
        }
    };

    let success = matches!(job_result, JobResult::Success(_));
    ticket.finish(success);
    shared
        .registry
        .record_complete(job.index_id(), job_result, duration_ms);
    shared.listener.finish_job(&job);

    drop(permit);
    lock(&shared.running).retain(|j| !Arc::ptr_eq(j, &job));
    shared.idle.notify_waiters();
    debug!(worker, job_id = %job.id(), duration_ms, success, "Worker finished job");
}

/// Priority job scheduler with per-index exclusive execution.
///
/// Jobs may be submitted before [`SchedulerService::start`]; they wait in
/// the queue until workers run.
pub struct SchedulerService {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    shutdown_token: Mutex<CancellationToken>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create a scheduler reporting through [`TracingListener`].
    ///
    /// The scheduler is created but not started.
    pub fn new(config: SchedulerConfig, executor: Arc<dyn JobExecutor>) -> Result<Self, SchedulerError> {
        Self::with_listener(config, executor, Arc::new(TracingListener))
    }

    /// Create a scheduler reporting through the given listener.
    pub fn with_listener(
        config: SchedulerConfig,
        executor: Arc<dyn JobExecutor>,
        listener: Arc<dyn IndexListener>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;

        let wake = Arc::new(Notify::new());
        let shared = Shared {
            queue: Mutex::new(JobQueue::new()),
            running: Mutex::new(Vec::new()),
            locks: IndexLocks::with_notify(Arc::clone(&wake)),
            wake,
            idle: Notify::new(),
            executor,
            listener,
            registry: Arc::new(IndexRegistry::new()),
        };

        Ok(Self {
            shared: Arc::new(shared),
            config,
            shutdown_token: Mutex::new(CancellationToken::new()),
            workers: Mutex::new(Vec::new()),
            is_running: AtomicBool::new(false),
        })
    }

    /// Start the worker pool.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if the scheduler is already started.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *lock(&self.shutdown_token) = token.clone();

        let mut workers = lock(&self.workers);
        for worker in 0..self.config.worker_count {
            workers.push(tokio::spawn(worker_loop(
                worker,
                Arc::clone(&self.shared),
                token.clone(),
            )));
        }

        info!(
            workers = self.config.worker_count,
            pending = self.pending_count(),
            "Scheduler started"
        );
        Ok(())
    }

    /// Shutdown the scheduler gracefully.
    ///
    /// Workers stop claiming jobs; jobs already running are given up to the
    /// configured timeout to finish. Pending jobs stay queued and unfinished.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotRunning` if the scheduler is not started.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        lock(&self.shutdown_token).cancel();

        let workers = std::mem::take(&mut *lock(&self.workers));
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        match tokio::time::timeout(timeout, futures::future::join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(error = %e, "Worker task failed");
                    }
                }
            }
            Err(_) => warn!(
                running = self.running_count(),
                timeout_secs = self.config.shutdown_timeout_secs,
                "Shutdown timed out with jobs still running"
            ),
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!(pending = self.pending_count(), "Scheduler shutdown complete");
        Ok(())
    }

    /// Queue a job.
    ///
    /// If the most recent pending job for the same index is equal work, that
    /// job is returned and nothing new is queued.
    pub fn submit(&self, job: IndexJob) -> Arc<IndexJob> {
        let enqueued = lock(&self.shared.queue).push(Arc::new(job));
        match enqueued {
            Enqueued::Queued(job) => {
                debug!(
                    job_id = %job.id(),
                    index = %job.index_id(),
                    priority = %job.priority(),
                    "Job queued"
                );
                self.shared.wake.notify_waiters();
                job
            }
            Enqueued::Duplicate(job) => {
                self.shared
                    .listener
                    .debug(Some(&job), "Equal work already pending, reusing queued job");
                job
            }
        }
    }

    /// Wait until no job is pending or running.
    ///
    /// Never resolves while jobs are pending and the scheduler is stopped.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    pub fn running_count(&self) -> usize {
        lock(&self.shared.running).len()
    }

    /// Whether a job is executing against the index.
    pub fn is_indexing(&self, index_id: &str) -> bool {
        self.shared.locks.is_locked(index_id)
    }

    /// Running and pending jobs submitted by a requester.
    pub fn jobs_for_requester(&self, requester: &Requester) -> Vec<Arc<IndexJob>> {
        self.jobs_matching(|job| job.is_for_requester(requester))
    }

    /// Running and pending jobs targeting an index.
    pub fn jobs_for_index(&self, index_id: &str) -> Vec<Arc<IndexJob>> {
        self.jobs_matching(|job| job.index_id() == index_id)
    }

    fn jobs_matching<F>(&self, mut predicate: F) -> Vec<Arc<IndexJob>>
    where
        F: FnMut(&IndexJob) -> bool,
    {
        let queue = lock(&self.shared.queue);
        let mut jobs: Vec<Arc<IndexJob>> = lock(&self.shared.running)
            .iter()
            .filter(|job| predicate(job))
            .cloned()
            .collect();
        jobs.extend(queue.matching(predicate));
        jobs
    }

    /// Per-index execution statistics.
    pub fn registry(&self) -> Arc<IndexRegistry> {
        Arc::clone(&self.shared.registry)
    }

    /// Check if the scheduler is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use crate::listener::Level;
    use crate::testing::{clear_job, content_job, job_for};
    use indexer_pipeline::{IndexOutcome, PipelineError};
    use indexer_types::Priority;
    use std::collections::HashMap;
    use std::error::Error;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Condvar;

    /// Records execution order and per-index concurrency.
    ///
    /// Content IDs starting with `fail` return a configuration error, with
    /// `panic` panic.
    #[derive(Default)]
    struct Recording {
        order: Mutex<Vec<String>>,
        active: Mutex<HashMap<String, usize>>,
        max_active: AtomicUsize,
        delay: Duration,
    }

    impl Recording {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn order(&self) -> Vec<String> {
            self.order.lock().unwrap().clone()
        }
    }

    impl JobExecutor for Recording {
        fn execute(&self, job: &IndexJob) -> Result<IndexOutcome, PipelineError> {
            let index = job.index_id().to_string();
            {
                let mut active = self.active.lock().unwrap();
                let count = active.entry(index.clone()).or_default();
                *count += 1;
                self.max_active.fetch_max(*count, Ordering::SeqCst);
            }

            std::thread::sleep(self.delay);
            let label = job
                .content_id()
                .map(|c| c.id().to_string())
                .unwrap_or_else(|| format!("clear:{}", index));
            self.order.lock().unwrap().push(label.clone());

            if let Some(count) = self.active.lock().unwrap().get_mut(&index) {
                *count -= 1;
            }

            if label.starts_with("fail") {
                return Err(PipelineError::TranslatorNotFound("image/png".to_string()));
            }
            if label.starts_with("panic") {
                panic!("executor panic");
            }
            Ok(IndexOutcome::Indexed {
                documents: 1,
                spilled: false,
            })
        }
    }

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
    }

    impl IndexListener for EventLog {
        fn start_job(&self, job: &IndexJob) {
            self.events.lock().unwrap().push(format!("start {}", job.describe()));
        }

        fn finish_job(&self, job: &IndexJob) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish {} {}", job.describe(), job.state()));
        }

        fn message(
            &self,
            level: Level,
            _job: Option<&IndexJob>,
            message: &str,
            cause: Option<&(dyn Error + 'static)>,
        ) {
            if level >= Level::Warn {
                self.events.lock().unwrap().push(format!(
                    "{:?} {} ({})",
                    level,
                    message,
                    cause.map(|e| e.to_string()).unwrap_or_default()
                ));
            }
        }
    }

    fn scheduler(executor: Arc<dyn JobExecutor>, workers: usize) -> SchedulerService {
        SchedulerService::new(
            SchedulerConfig::default().with_worker_count(workers),
            executor,
        )
        .unwrap()
    }

    async fn settle(service: &SchedulerService) {
        tokio::time::timeout(Duration::from_secs(10), service.wait_idle())
            .await
            .expect("scheduler did not go idle");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = SchedulerService::new(
            SchedulerConfig::default().with_worker_count(0),
            Arc::new(Recording::default()),
        );
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_high_runs_before_earlier_low() {
        let executor = Arc::new(Recording::default());
        let service = scheduler(executor.clone(), 4);

        let b = service.submit(content_job("b", "x", Priority::Low));
        let a = service.submit(content_job("a", "x", Priority::High));
        service.start().await.unwrap();
        settle(&service).await;

        assert_eq!(executor.order(), vec!["a", "b"]);
        assert!(a.is_success());
        assert!(b.is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifo_within_priority() {
        let executor = Arc::new(Recording::default());
        let service = scheduler(executor.clone(), 4);

        let expected: Vec<String> = (0..15).map(|i| format!("doc{:02}", i)).collect();
        for id in &expected {
            service.submit(content_job(id, "x", Priority::Low));
        }
        service.start().await.unwrap();
        settle(&service).await;

        assert_eq!(executor.order(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_job_per_index_at_a_time() {
        let executor = Arc::new(Recording::with_delay(Duration::from_millis(2)));
        let service = scheduler(executor.clone(), 4);
        service.start().await.unwrap();

        for i in 0..8 {
            for index in ["x", "y", "z"] {
                service.submit(content_job(&format!("{}{}", index, i), index, Priority::Low));
            }
        }
        settle(&service).await;

        assert_eq!(executor.order().len(), 24);
        assert_eq!(executor.max_active.load(Ordering::SeqCst), 1);

        for index in ["x", "y", "z"] {
            let status = service.registry().get_status(index).unwrap();
            assert_eq!(status.run_count, 8);
            assert!(!status.is_running);
        }
    }

    /// Blocks jobs for `x` until a job for `y` has run.
    #[derive(Default)]
    struct Handoff {
        y_done: Mutex<bool>,
        signal: Condvar,
    }

    impl JobExecutor for Handoff {
        fn execute(&self, job: &IndexJob) -> Result<IndexOutcome, PipelineError> {
            if job.index_id() == "y" {
                *self.y_done.lock().unwrap() = true;
                self.signal.notify_all();
                return Ok(IndexOutcome::Deleted);
            }

            let done = self.y_done.lock().unwrap();
            let (done, _) = self
                .signal
                .wait_timeout_while(done, Duration::from_secs(5), |done| !*done)
                .unwrap();
            if *done {
                Ok(IndexOutcome::Deleted)
            } else {
                Err(PipelineError::Io(std::io::Error::other("y never ran")))
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_busy_index_does_not_block_others() {
        let service = scheduler(Arc::new(Handoff::default()), 2);

        let x1 = service.submit(content_job("x1", "x", Priority::High));
        let x2 = service.submit(content_job("x2", "x", Priority::High));
        let y1 = service.submit(content_job("y1", "y", Priority::Low));
        service.start().await.unwrap();
        settle(&service).await;

        assert!(x1.is_success());
        assert!(x2.is_success());
        assert!(y1.is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_releases_index() {
        let executor = Arc::new(Recording::default());
        let service = scheduler(executor.clone(), 2);

        let failed = service.submit(content_job("fail-1", "x", Priority::High));
        let ok = service.submit(content_job("ok-1", "x", Priority::Low));
        let other = service.submit(content_job("other", "y", Priority::Low));
        service.start().await.unwrap();
        settle(&service).await;

        assert_eq!(failed.state(), JobState::Failed);
        assert_eq!(ok.state(), JobState::Succeeded);
        assert_eq!(other.state(), JobState::Succeeded);
        assert!(!service.is_indexing("x"));

        let status = service.registry().get_status("x").unwrap();
        assert_eq!(status.run_count, 2);
        assert_eq!(status.error_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_job_fails_and_releases_index() {
        let executor = Arc::new(Recording::default());
        let service = scheduler(executor.clone(), 1);

        let panicked = service.submit(content_job("panic-1", "x", Priority::High));
        let after = service.submit(content_job("after", "x", Priority::Low));
        service.start().await.unwrap();
        settle(&service).await;

        assert_eq!(panicked.state(), JobState::Failed);
        assert_eq!(after.state(), JobState::Succeeded);
        assert!(service.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_listener_events() {
        let log = Arc::new(EventLog::default());
        let service = SchedulerService::with_listener(
            SchedulerConfig::default().with_worker_count(1),
            Arc::new(Recording::default()),
            log.clone(),
        )
        .unwrap();

        service.submit(content_job("fail-1", "x", Priority::High));
        service.submit(clear_job("x", Priority::Low));
        service.start().await.unwrap();
        settle(&service).await;

        let events = log.events.lock().unwrap().clone();
        assert_eq!(events[0], "start doc:fail-1 -> x");
        assert!(events[1].starts_with("Error configuration error"));
        assert!(events[1].contains("image/png"));
        assert_eq!(events[2], "finish doc:fail-1 -> x failed");
        assert_eq!(events[3], "start clear x");
        assert_eq!(events[4], "finish clear x succeeded");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lifecycle() {
        let executor = Arc::new(Recording::default());
        let service = scheduler(executor.clone(), 2);

        assert!(matches!(
            service.shutdown().await,
            Err(SchedulerError::NotRunning)
        ));

        service.start().await.unwrap();
        assert!(service.is_running());
        assert!(matches!(
            service.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));
        settle(&service).await;

        service.shutdown().await.unwrap();
        assert!(!service.is_running());

        let queued = service.submit(content_job("late", "x", Priority::Low));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.pending_count(), 1);
        assert_eq!(queued.state(), JobState::Pending);

        service.start().await.unwrap();
        settle(&service).await;
        assert!(queued.is_success());
        service.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_lets_running_job_finish() {
        let executor = Arc::new(Recording::with_delay(Duration::from_millis(200)));
        let service = scheduler(executor.clone(), 1);

        let slow = service.submit(content_job("slow", "x", Priority::Low));
        let queued = service.submit(content_job("queued", "x", Priority::Low));
        service.start().await.unwrap();

        while slow.state() == JobState::Pending {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        service.shutdown().await.unwrap();

        assert!(slow.is_success());
        assert_eq!(queued.state(), JobState::Pending);
        assert_eq!(service.pending_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_submission_reuses_job() {
        let executor = Arc::new(Recording::default());
        let service = scheduler(executor.clone(), 2);

        let first = service.submit(content_job("a", "x", Priority::Low));
        let second = service.submit(content_job("a", "x", Priority::Low));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(service.pending_count(), 1);

        service.start().await.unwrap();
        settle(&service).await;
        assert_eq!(executor.order(), vec!["a"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_status_queries() {
        let service = scheduler(Arc::new(Recording::default()), 2);

        service.submit(job_for("a", "x", "alice"));
        service.submit(job_for("b", "y", "bob"));
        service.submit(job_for("c", "x", "bob"));

        assert_eq!(service.pending_count(), 3);
        assert_eq!(service.running_count(), 0);
        assert_eq!(service.jobs_for_requester(&Requester::new("bob")).len(), 2);
        assert_eq!(service.jobs_for_index("x").len(), 2);
        assert!(!service.is_indexing("x"));

        service.start().await.unwrap();
        settle(&service).await;
        assert!(service.jobs_for_requester(&Requester::new("bob")).is_empty());
        assert_eq!(service.registry().index_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_wait_finished_from_requester() {
        let service = scheduler(Arc::new(Recording::with_delay(Duration::from_millis(20))), 2);
        service.start().await.unwrap();

        let job = service.submit(content_job("a", "x", Priority::High));
        let state = tokio::time::timeout(Duration::from_secs(5), job.wait_finished())
            .await
            .unwrap();
        assert_eq!(state, JobState::Succeeded);
    }
}
