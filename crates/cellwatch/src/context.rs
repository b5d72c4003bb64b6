//! Shared scan state
//!
//! The supervisor and the notification handler publish the file they are
//! currently reading here; the timeout monitor observes it. The marker is
//! a single slot with last-writer-wins semantics, so `finish` matches on
//! the path and only takes its own entry. The context also carries the
//! per-document-key locks both entry points must hold around a read, and
//! the cooperative stop flag, checked at file boundaries only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// The file currently being read, with its start time
#[derive(Debug, Clone)]
pub struct InFlight {
    pub path: PathBuf,
    pub started: Instant,
}

/// Shared marker state between the scan loop and the timeout monitor
#[derive(Debug, Default)]
pub struct ScanContext {
    current: Mutex<Option<InFlight>>,
    stop: AtomicBool,
    locks: KeyLocks,
}

impl ScanContext {
    pub fn new() -> Self {
        ScanContext::default()
    }

    /// Publish `path` as the file now being read
    pub fn begin(&self, path: &Path) {
        self.begin_at(path, Instant::now());
    }

    pub(crate) fn begin_at(&self, path: &Path, started: Instant) {
        let mut current = self.lock_current();
        *current = Some(InFlight {
            path: path.to_path_buf(),
            started,
        });
    }

    /// Clear the marker after a read of `path`.
    ///
    /// Returns `false` if the marker was already gone, which means the
    /// monitor cleared it and the read overran its ceiling. A marker
    /// belonging to a different path was published by the other entry
    /// point since; it is left alone and the read counts as in time.
    pub fn finish(&self, path: &Path) -> bool {
        let mut current = self.lock_current();
        match current.as_ref() {
            Some(in_flight) if in_flight.path == path => {
                *current = None;
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Snapshot of the current marker, if any
    pub fn current(&self) -> Option<InFlight> {
        self.lock_current().clone()
    }

    /// Clear the marker without caring whether it was set
    pub fn clear_current(&self) {
        *self.lock_current() = None;
    }

    /// Handle for the lock guarding baseline `key`.
    ///
    /// Both the supervisor and the live handler lock this around their
    /// read/diff/save pass so the same document is never processed twice
    /// concurrently.
    pub fn lock_key(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.for_key(key)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-document-key exclusion.
///
/// The supervisor and the live watcher may run concurrently; they must never
/// operate on the same baseline key at the same time.
#[derive(Debug, Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        KeyLocks::default()
    }

    /// Handle for the lock guarding `key`; lock it to enter the section
    pub fn for_key(&self, key: &str) -> Arc<Mutex<()>> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reports_whether_marker_survived() {
        let ctx = ScanContext::new();
        ctx.begin(Path::new("a.xlsx"));
        assert!(ctx.finish(Path::new("a.xlsx")));

        ctx.begin(Path::new("b.xlsx"));
        ctx.clear_current();
        assert!(!ctx.finish(Path::new("b.xlsx")));
    }

    #[test]
    fn test_finish_leaves_another_publishers_marker_alone() {
        let ctx = ScanContext::new();
        ctx.begin(Path::new("a.xlsx"));
        ctx.begin(Path::new("b.xlsx"));

        // The overwritten reader is not the one that timed out.
        assert!(ctx.finish(Path::new("a.xlsx")));
        assert_eq!(ctx.current().unwrap().path, PathBuf::from("b.xlsx"));
    }

    #[test]
    fn test_current_reflects_marker() {
        let ctx = ScanContext::new();
        assert!(ctx.current().is_none());
        ctx.begin(Path::new("a.xlsx"));
        assert_eq!(ctx.current().unwrap().path, PathBuf::from("a.xlsx"));
    }

    #[test]
    fn test_stop_flag() {
        let ctx = ScanContext::new();
        assert!(!ctx.stop_requested());
        ctx.request_stop();
        assert!(ctx.stop_requested());
    }

    #[test]
    fn test_key_locks_same_key_same_lock() {
        let locks = KeyLocks::new();
        let a = locks.for_key("Report.xlsx");
        let b = locks.for_key("Report.xlsx");
        let c = locks.for_key("Other.xlsx");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
