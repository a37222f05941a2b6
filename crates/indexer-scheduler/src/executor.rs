//! Job execution boundary.

use std::sync::Arc;

use indexer_pipeline::{IndexOutcome, IndexPipeline, PipelineError};

use crate::job::{IndexJob, JobKind};

/// Runs one claimed job to completion.
///
/// Called on a blocking thread; implementations may do slow I/O.
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &IndexJob) -> Result<IndexOutcome, PipelineError>;
}

/// Executes jobs through an [`IndexPipeline`] against the job's index.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    pipeline: Arc<IndexPipeline>,
}

impl PipelineExecutor {
    pub fn new(pipeline: Arc<IndexPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<IndexPipeline> {
        &self.pipeline
    }
}

impl JobExecutor for PipelineExecutor {
    fn execute(&self, job: &IndexJob) -> Result<IndexOutcome, PipelineError> {
        let engine = job.index().as_ref();
        match job.kind() {
            JobKind::Mutate { content_id, config } => {
                self.pipeline
                    .index_content(engine, content_id, config.as_ref(), job.parameters())
            }
            JobKind::ClearIndex => self.pipeline.clear_index(engine),
        }
    }
}
