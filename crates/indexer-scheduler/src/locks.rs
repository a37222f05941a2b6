//! Per-index exclusive execution.
//!
//! Each index ID maps to a flag claimed with an atomic compare-and-swap. A
//! successful claim returns an [`IndexPermit`]; the index is locked until
//! the permit is dropped, whichever way the job ended.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

/// Keyed map of index locks.
#[derive(Debug)]
pub struct IndexLocks {
    flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
    released: Arc<Notify>,
}

impl Default for IndexLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexLocks {
    pub fn new() -> Self {
        Self::with_notify(Arc::new(Notify::new()))
    }

    /// Locks that signal `released` whenever a permit is dropped.
    pub fn with_notify(released: Arc<Notify>) -> Self {
        Self {
            flags: Mutex::new(HashMap::new()),
            released,
        }
    }

    fn flag(&self, index_id: &str) -> Arc<AtomicBool> {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            flags
                .entry(index_id.to_string())
                .or_insert_with(|| Arc::new(AtomicBool::new(false))),
        )
    }

    /// Attempt to lock an index.
    ///
    /// Returns `None` if another permit for the index is alive.
    pub fn try_acquire(&self, index_id: &str) -> Option<IndexPermit> {
        let flag = self.flag(index_id);
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(IndexPermit {
                index_id: index_id.to_string(),
                flag,
                released: Arc::clone(&self.released),
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, index_id: &str) -> bool {
        let flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        flags
            .get(index_id)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Index IDs currently locked, sorted.
    pub fn locked(&self) -> Vec<String> {
        let flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = flags
            .iter()
            .filter(|(_, flag)| flag.load(Ordering::SeqCst))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// RAII lock on one index. Dropping it unlocks the index and wakes waiters.
#[derive(Debug)]
pub struct IndexPermit {
    index_id: String,
    flag: Arc<AtomicBool>,
    released: Arc<Notify>,
}

impl IndexPermit {
    pub fn index_id(&self) -> &str {
        &self.index_id
    }
}

impl Drop for IndexPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_exclusive_per_index() {
        let locks = IndexLocks::new();

        let permit = locks.try_acquire("x");
        assert!(permit.is_some());
        assert!(locks.is_locked("x"));
        assert!(locks.try_acquire("x").is_none());

        drop(permit);
        assert!(!locks.is_locked("x"));
        assert!(locks.try_acquire("x").is_some());
    }

    #[test]
    fn test_indexes_are_independent() {
        let locks = IndexLocks::new();
        let _x = locks.try_acquire("x").unwrap();
        let _y = locks.try_acquire("y").unwrap();

        assert_eq!(locks.locked(), vec!["x".to_string(), "y".to_string()]);
        assert!(!locks.is_locked("z"));
    }

    #[test]
    fn test_permit_released_on_panic() {
        let locks = Arc::new(IndexLocks::new());
        let worker = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let _permit = locks.try_acquire("x").unwrap();
                panic!("job blew up");
            })
        };

        assert!(worker.join().is_err());
        assert!(!locks.is_locked("x"));
    }

    #[test]
    fn test_concurrent_claims_are_exclusive() {
        let locks = Arc::new(IndexLocks::new());
        let active = Arc::new(AtomicU32::new(0));
        let max_active = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                thread::spawn(move || {
                    for _ in 0..20 {
                        if let Some(_permit) = locks.try_acquire("x") {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            max_active.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(200));
                            active.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(!locks.is_locked("x"));
    }

    #[tokio::test]
    async fn test_release_notifies() {
        let released = Arc::new(Notify::new());
        let locks = IndexLocks::with_notify(Arc::clone(&released));
        let permit = locks.try_acquire("x").unwrap();

        let notified = released.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), notified)
            .await
            .unwrap();
    }
}
