//! Job attribution and priority types.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Priority of an index job.
///
/// Two levels only. `High` sorts before `Low`, so an ascending sort
/// yields the order in which jobs are serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Always processed before `Low`
    High,
    /// Always processed after `High`
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "low" => Ok(Priority::Low),
            other => Err(IndexerError::InvalidInput(format!(
                "unknown priority: {}",
                other
            ))),
        }
    }
}

/// The caller on whose behalf a job was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Requester(String);

impl Requester {
    pub fn new(requester_id: impl Into<String>) -> Self {
        Self(requester_id.into())
    }

    /// Stable requester ID used for attribution and ownership queries
    pub fn requester_id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
