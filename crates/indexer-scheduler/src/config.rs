//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use indexer_types::Settings;

use crate::SchedulerError;

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker tasks draining the queue.
    /// Defaults to 4.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Timeout in seconds for graceful shutdown.
    /// Running jobs get this long to finish before shutdown returns.
    /// Defaults to 30 seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_worker_count() -> usize {
    4
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Derive the scheduler configuration from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            worker_count: settings.worker_count,
            shutdown_timeout_secs: settings.shutdown_timeout_secs,
        }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    /// # Errors
    ///
    /// Returns `SchedulerError::Config` when no worker would run.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.worker_count == 0 {
            return Err(SchedulerError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
