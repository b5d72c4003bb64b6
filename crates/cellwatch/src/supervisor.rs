//! Batch scan supervisor
//!
//! Drives snapshot/diff/persist over a discovered batch of files, one at a
//! time to bound peak memory. Progress is persisted after every file so an
//! interrupted batch resumes at the first unprocessed index. A memory
//! ceiling halts the batch rather than degrade, and an advisory timeout
//! monitor flags reads that overran their ceiling.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};
use walkdir::WalkDir;

use cellwatch_core::SnapshotSource;
use cellwatch_store::{BaselineStore, ChangeLogSink, ProgressFile, ProgressState};

use crate::cache::LocalCache;
use crate::config::WatchConfig;
use crate::context::ScanContext;
use crate::monitor::TimeoutMonitor;
use crate::pipeline::{sync_baseline, SyncOutcome};

/// Terminal classification of one file in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Ok,
    Skipped,
    Error,
    Timeout,
}

/// Why the batch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEnd {
    /// Every file was processed
    Completed,
    /// The cooperative stop flag tripped at a file boundary
    Stopped,
    /// The memory ceiling was still exceeded after a settling re-check
    MemoryHalt,
}

/// Tally of one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub processed: usize,
    pub ok: usize,
    pub skipped: usize,
    pub errors: usize,
    pub timeouts: usize,
    pub changes: usize,
    pub write_failures: usize,
    pub ended: BatchEnd,
}

impl ScanSummary {
    fn new(total: usize) -> Self {
        ScanSummary {
            total,
            processed: 0,
            ok: 0,
            skipped: 0,
            errors: 0,
            timeouts: 0,
            changes: 0,
            write_failures: 0,
            ended: BatchEnd::Completed,
        }
    }
}

/// Sequential batch scanner over a snapshot source
pub struct ScanSupervisor<S> {
    source: S,
    config: WatchConfig,
    store: BaselineStore,
    sink: ChangeLogSink,
    progress: ProgressFile,
    cache: Option<LocalCache>,
    context: Arc<ScanContext>,
}

impl<S: SnapshotSource> ScanSupervisor<S> {
    pub fn new(source: S, config: WatchConfig) -> Self {
        Self::with_context(source, config, Arc::new(ScanContext::new()))
    }

    /// Build against an existing context, so a live watcher sharing it
    /// never processes the same document key concurrently with the batch
    pub fn with_context(source: S, config: WatchConfig, context: Arc<ScanContext>) -> Self {
        let store = BaselineStore::new(&config.baseline_dir);
        let sink = ChangeLogSink::new(&config.change_log);
        let progress = ProgressFile::new(&config.progress_file);
        let cache = config
            .use_local_cache
            .then(|| LocalCache::new(&config.cache_dir));
        ScanSupervisor {
            source,
            config,
            store,
            sink,
            progress,
            cache,
            context,
        }
    }

    /// Shared context handle, for wiring a stop signal or external monitor
    pub fn context(&self) -> Arc<ScanContext> {
        self.context.clone()
    }

    /// Discover watched files under the configured roots, sorted for a
    /// stable batch order (resume depends on it)
    pub fn discover_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in &self.config.roots {
            if root.is_file() {
                files.push(root.clone());
                continue;
            }
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        }
        files.retain(|path| {
            self.config.is_watched_extension(path) && !WatchConfig::is_lock_artifact(path)
        });
        files.sort();
        files.dedup();
        files
    }

    /// Discover and scan the full batch
    pub fn run(&self) -> ScanSummary {
        let files = self.discover_files();
        self.run_batch(&files)
    }

    /// Scan an explicit batch, resuming from a saved position when its
    /// total matches the batch size
    pub fn run_batch(&self, files: &[PathBuf]) -> ScanSummary {
        let total = files.len();
        let mut summary = ScanSummary::new(total);

        let start = match self.progress.load() {
            Some(state) if state.total == total => {
                let completed = state.completed.min(total);
                if completed > 0 {
                    log::info!("resuming batch at file {completed} of {total}");
                }
                completed
            }
            Some(state) => {
                log::info!(
                    "ignoring stale progress ({} of {}), batch size is now {total}",
                    state.completed,
                    state.total
                );
                0
            }
            None => 0,
        };

        let _monitor = self.config.read_timeout().map(|limit| {
            TimeoutMonitor::spawn(self.context.clone(), limit, Duration::from_secs(1))
        });

        let mut memory = MemoryGuard::new(self.config.memory_ceiling_mb);

        for (index, path) in files.iter().enumerate().skip(start) {
            if self.context.stop_requested() {
                log::info!("stop requested, halting batch after {index} of {total} files");
                summary.ended = BatchEnd::Stopped;
                self.persist_progress(index, total, &mut summary);
                return summary;
            }

            if memory.over_ceiling_after_settle() {
                log::error!("memory ceiling exceeded, halting batch at file {index} of {total}");
                summary.ended = BatchEnd::MemoryHalt;
                self.persist_progress(index, total, &mut summary);
                return summary;
            }

            let outcome = self.process_file(path, &mut summary);
            summary.processed += 1;
            match outcome {
                FileOutcome::Ok => summary.ok += 1,
                FileOutcome::Skipped => summary.skipped += 1,
                FileOutcome::Error => summary.errors += 1,
                FileOutcome::Timeout => summary.timeouts += 1,
            }

            self.persist_progress(index + 1, total, &mut summary);
        }

        if let Err(err) = self.progress.clear() {
            log::warn!("failed to remove progress file: {err}");
        }
        summary.ended = BatchEnd::Completed;
        summary
    }

    fn process_file(&self, path: &Path, summary: &mut ScanSummary) -> FileOutcome {
        if self.config.matches_skip(path) {
            log::info!("skipping {} (force-exclusion match)", path.display());
            return FileOutcome::Skipped;
        }

        // Hold the document-key lock so a live modify event for the same
        // file waits out this pass instead of racing it.
        let key = BaselineStore::key_for(path);
        let key_lock = self.context.lock_key(&key);
        let _key_guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.context.begin(path);
        let result = sync_baseline(
            &self.source,
            path,
            self.cache.as_ref(),
            &self.store,
            &self.sink,
            self.config.diff_mode,
            true,
        );
        // A cleared marker means the monitor flagged this read as overrun.
        let within_ceiling = self.context.finish(path);

        match result {
            Ok(report) => {
                if report.write_failed {
                    summary.write_failures += 1;
                }
                if let SyncOutcome::Changed(count) = report.outcome {
                    summary.changes += count;
                }
                if within_ceiling {
                    FileOutcome::Ok
                } else {
                    FileOutcome::Timeout
                }
            }
            Err(err) => {
                log::warn!("failed to process {}: {err}", path.display());
                if within_ceiling {
                    FileOutcome::Error
                } else {
                    FileOutcome::Timeout
                }
            }
        }
    }

    fn persist_progress(&self, completed: usize, total: usize, summary: &mut ScanSummary) {
        if let Err(err) = self.progress.save(&ProgressState::now(completed, total)) {
            log::error!("failed to persist scan progress: {err}");
            summary.write_failures += 1;
        }
    }
}

/// Process RSS guard with a one-shot settling re-check
struct MemoryGuard {
    ceiling_bytes: u64,
    sys: System,
    pid: Option<Pid>,
}

impl MemoryGuard {
    fn new(ceiling_mb: u64) -> Self {
        MemoryGuard {
            ceiling_bytes: ceiling_mb.saturating_mul(1024 * 1024),
            sys: System::new(),
            pid: get_current_pid().ok(),
        }
    }

    /// True when RSS still exceeds the ceiling after a settling pause
    fn over_ceiling_after_settle(&mut self) -> bool {
        if self.ceiling_bytes == 0 {
            return false;
        }
        if !self.over_ceiling() {
            return false;
        }
        // Give allocator reclamation a moment, then decide.
        log::warn!("memory ceiling exceeded, re-checking after settle");
        std::thread::sleep(Duration::from_millis(500));
        self.over_ceiling()
    }

    fn over_ceiling(&mut self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match self.sys.process(pid) {
            Some(process) => process.memory() > self.ceiling_bytes,
            None => false,
        }
    }
}
