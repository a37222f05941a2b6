//! Per-index execution statistics.
//!
//! The `IndexRegistry` tracks, for every index that has run a job, the last
//! run time, duration, result and success/error counts. Indexes are added
//! on their first job.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    /// Job completed successfully with a summary of what it did
    Success(String),
    /// Job failed with an error message
    Failed(String),
}

/// Status of one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub index_id: String,
    /// When the last job on this index started
    pub last_run: Option<DateTime<Utc>>,
    /// Duration of the last job in milliseconds
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    /// ID of the last job started on this index
    pub last_job_id: Option<String>,
    /// Total jobs finished on this index
    pub run_count: u64,
    /// Total failed jobs on this index
    pub error_count: u64,
    /// Whether a job is executing on this index
    pub is_running: bool,
}

impl IndexStatus {
    pub fn new(index_id: String) -> Self {
        Self {
            index_id,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            last_job_id: None,
            run_count: 0,
            error_count: 0,
            is_running: false,
        }
    }
}

/// Thread-safe registry of index statuses.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexes: RwLock<HashMap<String, IndexStatus>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, IndexStatus>> {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, IndexStatus>> {
        self.indexes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that a job started on an index.
    pub fn record_start(&self, index_id: &str, job_id: &str) {
        let mut indexes = self.write();
        let status = indexes
            .entry(index_id.to_string())
            .or_insert_with(|| IndexStatus::new(index_id.to_string()));
        status.is_running = true;
        status.last_run = Some(Utc::now());
        status.last_job_id = Some(job_id.to_string());
    }

    /// Record that the running job of an index completed.
    pub fn record_complete(&self, index_id: &str, result: JobResult, duration_ms: u64) {
        let mut indexes = self.write();
        let status = indexes
            .entry(index_id.to_string())
            .or_insert_with(|| IndexStatus::new(index_id.to_string()));
        status.is_running = false;
        status.last_duration_ms = Some(duration_ms);
        status.run_count += 1;
        if matches!(result, JobResult::Failed(_)) {
            status.error_count += 1;
        }
        status.last_result = Some(result);
    }

    pub fn get_status(&self, index_id: &str) -> Option<IndexStatus> {
        self.read().get(index_id).cloned()
    }

    /// Status of every known index, sorted by index ID.
    pub fn get_all_status(&self) -> Vec<IndexStatus> {
        let mut all: Vec<IndexStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.index_id.cmp(&b.index_id));
        all
    }

    pub fn is_running(&self, index_id: &str) -> bool {
        self.read()
            .get(index_id)
            .map(|s| s.is_running)
            .unwrap_or(false)
    }

    pub fn index_count(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_start_registers_index() {
        let registry = IndexRegistry::new();
        assert!(registry.get_status("x").is_none());

        registry.record_start("x", "job-1");
        let status = registry.get_status("x").unwrap();
        assert!(status.is_running);
        assert!(status.last_run.is_some());
        assert_eq!(status.last_job_id.as_deref(), Some("job-1"));
        assert_eq!(status.run_count, 0);
        assert!(registry.is_running("x"));
    }

    #[test]
    fn test_record_complete_success() {
        let registry = IndexRegistry::new();
        registry.record_start("x", "job-1");
        registry.record_complete("x", JobResult::Success("indexed 2 documents".into()), 120);

        let status = registry.get_status("x").unwrap();
        assert!(!status.is_running);
        assert_eq!(status.last_duration_ms, Some(120));
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 0);
        assert_eq!(
            status.last_result,
            Some(JobResult::Success("indexed 2 documents".into()))
        );
    }

    #[test]
    fn test_record_complete_failure() {
        let registry = IndexRegistry::new();
        registry.record_start("x", "job-1");
        registry.record_complete("x", JobResult::Failed("no translator".into()), 3);

        let status = registry.get_status("x").unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 1);
    }

    #[test]
    fn test_get_all_status_sorted() {
        let registry = IndexRegistry::new();
        registry.record_start("b", "1");
        registry.record_start("a", "2");

        let ids: Vec<String> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.index_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.index_count(), 2);
    }

    #[test]
    fn test_thread_safety() {
        let registry = Arc::new(IndexRegistry::new());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let index = format!("index-{}", i % 3);
                    registry.record_start(&index, &i.to_string());
                    registry.record_complete(&index, JobResult::Success(String::new()), 1);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let total: u64 = registry.get_all_status().iter().map(|s| s.run_count).sum();
        assert_eq!(total, 10);
        assert_eq!(registry.index_count(), 3);
    }

    #[test]
    fn test_status_serialization() {
        let registry = IndexRegistry::new();
        registry.record_start("x", "job-1");
        registry.record_complete("x", JobResult::Failed("boom".into()), 5);

        let json = serde_json::to_string(&registry.get_status("x").unwrap()).unwrap();
        let parsed: IndexStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.error_count, 1);
        assert_eq!(parsed.last_result, Some(JobResult::Failed("boom".into())));
    }
}
