//! Command implementations (index, delete, clear, count).
//!
//! Every mutating command builds the translation pipeline and a scheduler,
//! submits one job per file (or one clear job), runs them to completion and
//! shuts the scheduler down.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};
use walkdir::WalkDir;

use indexer_pipeline::{
    guess_mime_type, Content, ContentFetcher, FileContentFetcher, IndexPipeline, PipelineError,
    SpillConfig, TranslatorRegistry,
};
use indexer_scheduler::{IndexJob, JobState, PipelineExecutor, SchedulerConfig, SchedulerService};
use indexer_search::{EngineConfig, IndexEngine, TantivyEngine};
use indexer_types::{ContentId, Priority, Requester, Settings};

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    workers_override: Option<usize>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    if let Some(workers) = workers_override {
        settings.worker_count = workers;
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global tracing subscriber.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Outcome counts of a command run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs left unfinished because the run was interrupted
    pub unfinished: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} jobs: {} succeeded, {} failed",
            self.submitted, self.succeeded, self.failed
        )?;
        if self.unfinished > 0 {
            write!(f, ", {} unfinished", self.unfinished)?;
        }
        Ok(())
    }
}

/// Content root, canonicalized. Defaults to the current directory.
pub fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("Content root {} is not accessible", root.display()))
}

/// Absolute form of a path that may no longer exist.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to read current directory")?
        .join(path))
}

/// Expand directories into the files below them, sorted per directory.
///
/// Paths that do not exist are kept as given.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry =
                    entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn content_ids(fetcher: &FileContentFetcher, paths: &[PathBuf]) -> Result<Vec<ContentId>> {
    collect_files(paths)?
        .iter()
        .map(|path| {
            let path = absolute(path)?;
            fetcher.content_id(&path).with_context(|| {
                format!(
                    "{} is outside the content root {}",
                    path.display(),
                    fetcher.root().display()
                )
            })
        })
        .collect()
}

fn open_engine(settings: &Settings, index_id: &str) -> Result<Arc<dyn IndexEngine>> {
    let config =
        EngineConfig::new(settings.expanded_index_root()).with_memory_mb(settings.writer_memory_mb);
    let engine = TantivyEngine::open(index_id, &config)
        .with_context(|| format!("Failed to open index '{}'", index_id))?;
    Ok(Arc::new(engine))
}

fn build_scheduler(settings: &Settings, fetcher: Arc<dyn ContentFetcher>) -> Result<SchedulerService> {
    let pipeline = IndexPipeline::new(
        fetcher,
        Arc::new(TranslatorRegistry::with_defaults()),
        SpillConfig::from_settings(settings),
    );
    let executor = Arc::new(PipelineExecutor::new(Arc::new(pipeline)));
    SchedulerService::new(SchedulerConfig::from_settings(settings), executor)
        .context("Failed to create scheduler")
}

/// Submit jobs, run them to completion and stop the scheduler.
///
/// Ctrl+C stops waiting; running jobs still finish before shutdown returns.
pub async fn run_jobs(scheduler: &SchedulerService, jobs: Vec<IndexJob>) -> Result<RunSummary> {
    let mut submitted: Vec<Arc<IndexJob>> = Vec::new();
    for job in jobs {
        let job = scheduler.submit(job);
        if !submitted.iter().any(|known| Arc::ptr_eq(known, &job)) {
            submitted.push(job);
        }
    }

    scheduler.start().await?;

    let wait_all = async {
        for job in &submitted {
            job.wait_finished().await;
        }
    };
    tokio::select! {
        _ = wait_all => {}
        _ = signal::ctrl_c() => {
            warn!("Interrupted, waiting for running jobs");
        }
    }

    scheduler.shutdown().await?;

    let mut summary = RunSummary {
        submitted: submitted.len(),
        ..Default::default()
    };
    for job in &submitted {
        match job.state() {
            JobState::Succeeded => summary.succeeded += 1,
            JobState::Failed => summary.failed += 1,
            JobState::Pending | JobState::Running => summary.unfinished += 1,
        }
    }
    info!(%summary, "Run complete");
    Ok(summary)
}

/// Index or re-index files.
pub async fn index_paths(
    settings: &Settings,
    root: &Path,
    index_id: &str,
    priority: Priority,
    requester: &str,
    params: Vec<(String, String)>,
    paths: &[PathBuf],
) -> Result<RunSummary> {
    let fetcher = Arc::new(FileContentFetcher::new(root));
    let ids = content_ids(&fetcher, paths)?;
    let engine = open_engine(settings, index_id)?;
    let scheduler = build_scheduler(settings, fetcher)?;

    let parameters: HashMap<String, String> = params.into_iter().collect();
    let requester = Requester::new(requester);
    let jobs = ids
        .into_iter()
        .map(|id| {
            IndexJob::new_job(
                id,
                None,
                priority,
                Arc::clone(&engine),
                requester.clone(),
                parameters.clone(),
            )
        })
        .collect();

    run_jobs(&scheduler, jobs).await
}

/// Content that is always reported as removed.
struct Removed {
    mime_type: &'static str,
}

impl Content for Removed {
    fn mime_type(&self) -> &str {
        self.mime_type
    }

    fn source(&mut self) -> io::Result<Box<dyn io::Read + Send>> {
        Err(io::Error::new(io::ErrorKind::NotFound, "content was removed"))
    }

    fn is_deleted(&self) -> bool {
        true
    }
}

/// Fetcher turning every file job into a removal, existing or not.
struct RemovalFetcher;

impl ContentFetcher for RemovalFetcher {
    fn fetch(&self, id: &ContentId) -> Result<Box<dyn Content>, PipelineError> {
        Ok(Box::new(Removed {
            mime_type: guess_mime_type(Path::new(id.id())),
        }))
    }
}

/// Remove the documents of files from the index.
pub async fn delete_paths(
    settings: &Settings,
    root: &Path,
    index_id: &str,
    paths: &[PathBuf],
) -> Result<RunSummary> {
    let ids = content_ids(&FileContentFetcher::new(root), paths)?;
    let engine = open_engine(settings, index_id)?;
    let scheduler = build_scheduler(settings, Arc::new(RemovalFetcher))?;

    let requester = Requester::new("cli");
    let jobs = ids
        .into_iter()
        .map(|id| {
            IndexJob::new_job(
                id,
                None,
                Priority::High,
                Arc::clone(&engine),
                requester.clone(),
                HashMap::new(),
            )
        })
        .collect();

    run_jobs(&scheduler, jobs).await
}

/// Remove every document of the index.
pub async fn clear_index(settings: &Settings, root: &Path, index_id: &str) -> Result<RunSummary> {
    let engine = open_engine(settings, index_id)?;
    let scheduler = build_scheduler(settings, Arc::new(FileContentFetcher::new(root)))?;
    let job = IndexJob::new_clear_job(Priority::High, engine, Requester::new("cli"));
    run_jobs(&scheduler, vec![job]).await
}

/// Number of committed documents in the index.
pub fn count_documents(settings: &Settings, index_id: &str) -> Result<u64> {
    let engine = open_engine(settings, index_id)?;
    engine
        .num_docs()
        .with_context(|| format!("Failed to count documents of '{}'", index_id))
}
