//! Per-job index configuration.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Rewrites a translated iXML stream before it is parsed.
///
/// Receives the merged parameters of the configuration and the job.
pub trait DocumentTransform: Send + Sync {
    fn transform(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        parameters: &HashMap<String, String>,
    ) -> io::Result<()>;
}

/// Named configuration applied to translated content.
#[derive(Clone, Default)]
pub struct IndexConfig {
    id: String,
    parameters: HashMap<String, String>,
    transform: Option<Arc<dyn DocumentTransform>>,
}

impl IndexConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Add a default parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn DocumentTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn transform(&self) -> Option<&Arc<dyn DocumentTransform>> {
        self.transform.as_ref()
    }

    /// Configuration defaults overlaid with job parameters.
    pub fn merged_parameters(&self, job_parameters: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = self.parameters.clone();
        merged.extend(job_parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl std::fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfig")
            .field("id", &self.id)
            .field("parameters", &self.parameters)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
