//! End-to-end test infrastructure for the content indexer.
//!
//! Provides a shared TestHarness wiring a file-backed content root, real
//! Tantivy indexes and the scheduler, plus a listener that records every
//! scheduler event for assertions.

use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexer_pipeline::{FileContentFetcher, IndexPipeline, SpillConfig, TranslatorRegistry};
use indexer_scheduler::{
    IndexJob, IndexListener, Level, PipelineExecutor, SchedulerConfig, SchedulerService,
};
use indexer_search::{EngineConfig, IndexEngine, TantivyEngine};
use indexer_types::{ContentId, Priority, Requester};

/// One event seen by the [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Started(String),
    Finished(String),
    Message {
        level: Level,
        job: Option<String>,
        message: String,
        cause: Option<String>,
    },
}

/// Listener keeping every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().expect("listener lock poisoned").clone()
    }

    /// Descriptions of started jobs, in start order.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::Started(job) => Some(job),
                _ => None,
            })
            .collect()
    }

    /// Messages logged at `Error` level.
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::Message {
                    level: Level::Error,
                    message,
                    ..
                } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().expect("listener lock poisoned").push(event);
    }
}

impl IndexListener for RecordingListener {
    fn start_job(&self, job: &IndexJob) {
        self.push(Recorded::Started(job.describe()));
    }

    fn finish_job(&self, job: &IndexJob) {
        self.push(Recorded::Finished(job.describe()));
    }

    fn message(
        &self,
        level: Level,
        job: Option<&IndexJob>,
        message: &str,
        cause: Option<&(dyn Error + 'static)>,
    ) {
        self.push(Recorded::Message {
            level,
            job: job.map(|j| j.describe()),
            message: message.to_string(),
            cause: cause.map(|e| e.to_string()),
        });
    }
}

/// Shared test harness for E2E tests.
///
/// Content files live under `content_root`; indexes are opened under
/// `index_root` and spill files go to `spill_dir`.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub content_root: PathBuf,
    pub index_root: PathBuf,
    pub spill_dir: PathBuf,
    pub fetcher: Arc<FileContentFetcher>,
    pub listener: Arc<RecordingListener>,
    engines: Mutex<HashMap<String, Arc<TantivyEngine>>>,
}

impl TestHarness {
    /// Create a new test harness with an empty content root.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir
            .path()
            .canonicalize()
            .expect("Failed to resolve temp dir");

        let content_root = base.join("content");
        let index_root = base.join("indexes");
        let spill_dir = base.join("spill");
        for dir in [&content_root, &index_root, &spill_dir] {
            std::fs::create_dir_all(dir).expect("Failed to create harness dir");
        }

        Self {
            _temp_dir: temp_dir,
            fetcher: Arc::new(FileContentFetcher::new(&content_root)),
            content_root,
            index_root,
            spill_dir,
            listener: Arc::new(RecordingListener::new()),
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Write a content file and return its content ID.
    pub fn write_file(&self, relative: &str, contents: impl AsRef<[u8]>) -> ContentId {
        let path = self.content_root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create content dir");
        }
        std::fs::write(&path, contents).expect("Failed to write content file");
        self.content_id(relative)
    }

    pub fn remove_file(&self, relative: &str) {
        std::fs::remove_file(self.content_root.join(relative)).expect("Failed to remove file");
    }

    pub fn content_id(&self, relative: &str) -> ContentId {
        self.fetcher
            .content_id(&self.content_root.join(relative))
            .expect("Path should be under the content root")
    }

    /// Open (once) the on-disk index with the given ID.
    pub fn engine(&self, index_id: &str) -> Arc<TantivyEngine> {
        let mut engines = self.engines.lock().expect("engine lock poisoned");
        let engine = engines.entry(index_id.to_string()).or_insert_with(|| {
            let config = EngineConfig::new(&self.index_root);
            Arc::new(TantivyEngine::open(index_id, &config).expect("Failed to open index"))
        });
        Arc::clone(engine)
    }

    pub fn num_docs(&self, index_id: &str) -> u64 {
        self.engine(index_id).num_docs().expect("Failed to count documents")
    }

    /// Scheduler over the default translators, spilling above `spill_threshold` bytes.
    pub fn scheduler(&self, worker_count: usize, spill_threshold: usize) -> SchedulerService {
        let pipeline = IndexPipeline::new(
            self.fetcher.clone(),
            Arc::new(TranslatorRegistry::with_defaults()),
            SpillConfig::new(&self.spill_dir).with_threshold(spill_threshold),
        );
        SchedulerService::with_listener(
            SchedulerConfig::default().with_worker_count(worker_count),
            Arc::new(PipelineExecutor::new(Arc::new(pipeline))),
            self.listener.clone(),
        )
        .expect("Failed to create scheduler")
    }

    pub fn content_job(&self, relative: &str, index_id: &str, priority: Priority) -> IndexJob {
        IndexJob::new_job(
            self.content_id(relative),
            None,
            priority,
            self.engine(index_id),
            Requester::new("e2e"),
            HashMap::new(),
        )
    }

    pub fn clear_job(&self, index_id: &str) -> IndexJob {
        IndexJob::new_clear_job(Priority::High, self.engine(index_id), Requester::new("e2e"))
    }

    /// Files currently left in the spill directory.
    pub fn spill_files(&self) -> Vec<PathBuf> {
        list_files(&self.spill_dir)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .expect("Failed to read dir")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect()
}

/// Canonical XML holding one document per title.
pub fn ixml_documents(titles: &[&str]) -> String {
    let mut xml = String::from("<documents version=\"3.0\">");
    for title in titles {
        xml.push_str("<document><field name=\"title\">");
        xml.push_str(title);
        xml.push_str("</field></document>");
    }
    xml.push_str("</documents>");
    xml
}

/// Run the scheduler until every submitted job finishes, then stop it.
pub async fn run_all(scheduler: &SchedulerService, jobs: Vec<IndexJob>) -> Vec<Arc<IndexJob>> {
    let submitted: Vec<Arc<IndexJob>> = jobs.into_iter().map(|job| scheduler.submit(job)).collect();
    scheduler.start().await.expect("Failed to start scheduler");
    for job in &submitted {
        job.wait_finished().await;
    }
    scheduler.shutdown().await.expect("Failed to stop scheduler");
    submitted
}
