//! Snapshot → diff → persist pipeline for a single document
//!
//! Shared by the batch supervisor and the live notification handler. A read
//! failure is the caller's problem (retry, timeout classification); a
//! persistence failure never is — it is logged, flagged on the report, and
//! the pipeline carries on so computed results are not silently dropped.

use std::path::Path;

use cellwatch_core::{diff, filter_identity_artifacts, DiffMode, SnapshotSource};
use cellwatch_store::{Baseline, BaselineStore, ChangeLogSink};

use crate::cache::LocalCache;
use crate::error::WatchResult;

/// What one pipeline pass concluded about a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No baseline existed; one was recorded without emitting changes
    FirstSeen,
    /// Content hash matched the baseline
    Unchanged,
    /// Content differed; carries the number of logged change records
    Changed(usize),
}

/// Outcome plus persistence health for one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// A baseline or change-log write failed (logged, not fatal)
    pub write_failed: bool,
}

/// Compare `path` against its stored baseline and converge the store.
///
/// `overwrite_unchanged` selects the batch-scan behavior of rewriting the
/// baseline even when the hash matched; the live handler leaves unchanged
/// baselines alone. With a cache, the read goes to a local copy while the
/// baseline key and the logged document path stay those of the original.
pub fn sync_baseline(
    source: &dyn SnapshotSource,
    path: &Path,
    cache: Option<&LocalCache>,
    store: &BaselineStore,
    sink: &ChangeLogSink,
    mode: DiffMode,
    overwrite_unchanged: bool,
) -> WatchResult<SyncReport> {
    let key = BaselineStore::key_for(path);
    let read_path = match cache {
        Some(cache) => cache.materialize(path),
        None => path.to_path_buf(),
    };
    let snapshot = source.snapshot(&read_path)?;
    let author = source.last_author(&read_path);
    let fresh = Baseline::from_snapshot(&snapshot, author.clone());

    let mut write_failed = false;

    let outcome = match store.load(&key) {
        None => {
            // First observation: record silently, emit nothing.
            write_failed |= !save_baseline(store, &key, &fresh);
            SyncOutcome::FirstSeen
        }
        Some(prior) if prior.content_hash == snapshot.content_hash => {
            if overwrite_unchanged {
                write_failed |= !save_baseline(store, &key, &fresh);
            }
            SyncOutcome::Unchanged
        }
        Some(prior) => {
            let changes = filter_identity_artifacts(diff(&prior.cells, &snapshot.sheets, mode));
            if !changes.is_empty() {
                if let Err(err) = sink.append(path, author.as_deref(), &changes) {
                    log::error!("change log write failed for {}: {err}", path.display());
                    write_failed = true;
                }
            }
            write_failed |= !save_baseline(store, &key, &fresh);
            SyncOutcome::Changed(changes.len())
        }
    };

    Ok(SyncReport {
        outcome,
        write_failed,
    })
}

/// Persist a baseline, logging instead of failing; returns success
fn save_baseline(store: &BaselineStore, key: &str, baseline: &Baseline) -> bool {
    match store.save(key, baseline) {
        Ok(()) => true,
        Err(err) => {
            log::error!("baseline write failed for {key}: {err}");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cellwatch_core::{
        CellRecord, DocumentSnapshot, Error, Result, Scalar, SheetMap, SheetSnapshot,
    };
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Snapshot source serving canned in-memory documents
    pub(crate) struct FixedSource {
        pub docs: HashMap<PathBuf, SheetMap>,
        pub author: Option<String>,
    }

    impl FixedSource {
        pub(crate) fn new() -> Self {
            FixedSource {
                docs: HashMap::new(),
                author: Some("alice".into()),
            }
        }

        pub(crate) fn put(&mut self, path: &str, sheets: SheetMap) {
            self.docs.insert(PathBuf::from(path), sheets);
        }
    }

    impl SnapshotSource for FixedSource {
        fn snapshot(&self, path: &Path) -> Result<DocumentSnapshot> {
            match self.docs.get(path) {
                Some(sheets) => Ok(DocumentSnapshot::from_sheets(sheets.clone())),
                None => Err(Error::read(path, "no such document")),
            }
        }

        fn last_author(&self, _path: &Path) -> Option<String> {
            self.author.clone()
        }
    }

    pub(crate) fn one_cell(value: f64) -> SheetMap {
        let mut sheet = SheetSnapshot::new();
        sheet.insert("A1".into(), CellRecord::value(value));
        let mut sheets = SheetMap::new();
        sheets.insert("Sheet1".into(), sheet);
        sheets
    }

    fn fixture(dir: &Path) -> (BaselineStore, ChangeLogSink) {
        (
            BaselineStore::new(dir.join("baselines")),
            ChangeLogSink::new(dir.join("changes.csv.gz")),
        )
    }

    #[test]
    fn test_first_observation_records_baseline_silently() {
        let dir = tempfile::tempdir().unwrap();
        let (store, sink) = fixture(dir.path());
        let mut source = FixedSource::new();
        source.put("/w/a.xlsx", one_cell(10.0));

        let report = sync_baseline(
            &source,
            Path::new("/w/a.xlsx"),
            None,
            &store,
            &sink,
            DiffMode::Full,
            false,
        )
        .unwrap();

        assert_eq!(report.outcome, SyncOutcome::FirstSeen);
        assert!(!report.write_failed);
        assert!(store.load("a.xlsx").is_some());
        assert!(!sink.path().exists());
    }

    #[test]
    fn test_unchanged_content_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (store, sink) = fixture(dir.path());
        let mut source = FixedSource::new();
        source.put("/w/a.xlsx", one_cell(10.0));

        let path = Path::new("/w/a.xlsx");
        sync_baseline(&source, path, None, &store, &sink, DiffMode::Full, false).unwrap();
        let report =
            sync_baseline(&source, path, None, &store, &sink, DiffMode::Full, false).unwrap();

        assert_eq!(report.outcome, SyncOutcome::Unchanged);
        assert!(!sink.path().exists());
    }

    #[test]
    fn test_changed_content_logs_and_replaces_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let (store, sink) = fixture(dir.path());
        let mut source = FixedSource::new();
        source.put("/w/a.xlsx", one_cell(10.0));

        let path = Path::new("/w/a.xlsx");
        sync_baseline(&source, path, None, &store, &sink, DiffMode::Full, false).unwrap();

        source.put("/w/a.xlsx", one_cell(20.0));
        let report =
            sync_baseline(&source, path, None, &store, &sink, DiffMode::Full, false).unwrap();

        assert_eq!(report.outcome, SyncOutcome::Changed(1));
        assert!(sink.path().exists());
        let baseline = store.load("a.xlsx").unwrap();
        assert_eq!(
            baseline.cells["Sheet1"]["A1"],
            CellRecord::value(Scalar::Number(20.0))
        );
    }

    #[test]
    fn test_formula_only_mode_suppresses_value_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (store, sink) = fixture(dir.path());
        let mut source = FixedSource::new();
        source.put("/w/a.xlsx", one_cell(10.0));

        let path = Path::new("/w/a.xlsx");
        sync_baseline(&source, path, None, &store, &sink, DiffMode::FormulaOnly, false).unwrap();

        source.put("/w/a.xlsx", one_cell(20.0));
        let report =
            sync_baseline(&source, path, None, &store, &sink, DiffMode::FormulaOnly, false).unwrap();

        // The content hash differs, so the baseline converges, but the
        // value-only edit produces no change records in this mode.
        assert_eq!(report.outcome, SyncOutcome::Changed(0));
        assert!(!sink.path().exists());
    }

    #[test]
    fn test_cached_read_keys_baseline_by_the_original_name() {
        let dir = tempfile::tempdir().unwrap();
        let (store, sink) = fixture(dir.path());
        let document = dir.path().join("Report.xlsx");
        std::fs::write(&document, b"payload").unwrap();

        let cache = LocalCache::new(&dir.path().join("cache"));
        let cached = cache.materialize(&document);
        assert_ne!(cached, document);

        // The source only knows the local copy, so a pass that read the
        // original path would fail.
        let mut source = FixedSource::new();
        source.put(cached.to_str().unwrap(), one_cell(10.0));

        let report = sync_baseline(
            &source,
            &document,
            Some(&cache),
            &store,
            &sink,
            DiffMode::Full,
            false,
        )
        .unwrap();

        assert_eq!(report.outcome, SyncOutcome::FirstSeen);
        assert!(store.load("Report.xlsx").is_some());
    }

    #[test]
    fn test_read_failure_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let (store, sink) = fixture(dir.path());
        let source = FixedSource::new();

        let result = sync_baseline(
            &source,
            Path::new("/w/missing.xlsx"),
            None,
            &store,
            &sink,
            DiffMode::Full,
            false,
        );
        assert!(result.is_err());
        assert!(store.load("missing.xlsx").is_none());
    }
}
