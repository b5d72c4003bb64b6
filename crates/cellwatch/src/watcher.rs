//! Live change watcher
//!
//! Subscribes to filesystem modify events and runs the diff pipeline per
//! touched document. Events for the same path are debounced via an
//! in-flight set, reads wait out a settle delay so the writing application
//! can finish flushing, and lock-style transient errors are retried a
//! bounded number of times before the event is abandoned.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};

use cellwatch_core::SnapshotSource;
use cellwatch_store::{BaselineStore, ChangeLogSink};

use crate::cache::LocalCache;
use crate::config::WatchConfig;
use crate::context::ScanContext;
use crate::error::{WatchError, WatchResult};
use crate::pipeline::{sync_baseline, SyncReport};

/// What the handler did with one modify event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    /// Directory, unwatched extension, lock artifact, or skip match
    Ignored,
    /// Another event for the same path is still being handled
    AlreadyInFlight,
    /// The pipeline ran to completion
    Done(SyncReport),
    /// Retries exhausted or a non-transient failure; logged and dropped
    Abandoned,
}

/// Per-event pipeline driver with debouncing and bounded retries
pub struct ChangeHandler<S> {
    source: S,
    config: WatchConfig,
    store: BaselineStore,
    sink: ChangeLogSink,
    cache: Option<LocalCache>,
    in_flight: Mutex<HashSet<PathBuf>>,
    context: Arc<ScanContext>,
}

impl<S: SnapshotSource> ChangeHandler<S> {
    pub fn new(source: S, config: WatchConfig) -> Self {
        Self::with_context(source, config, Arc::new(ScanContext::new()))
    }

    /// Build against an existing context. Sharing one context with a
    /// [`crate::ScanSupervisor`] serializes work on a document key across
    /// both entry points and lets one timeout monitor watch both.
    pub fn with_context(source: S, config: WatchConfig, context: Arc<ScanContext>) -> Self {
        let store = BaselineStore::new(&config.baseline_dir);
        let sink = ChangeLogSink::new(&config.change_log);
        let cache = config
            .use_local_cache
            .then(|| LocalCache::new(&config.cache_dir));
        ChangeHandler {
            source,
            config,
            store,
            sink,
            cache,
            in_flight: Mutex::new(HashSet::new()),
            context,
        }
    }

    /// Handle one modify event for `path`
    pub fn handle_modify(&self, path: &Path) -> HandleResult {
        if path.is_dir()
            || !self.config.is_watched_extension(path)
            || WatchConfig::is_lock_artifact(path)
            || self.config.matches_skip(path)
        {
            return HandleResult::Ignored;
        }

        {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(path.to_path_buf()) {
                return HandleResult::AlreadyInFlight;
            }
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            path: path.to_path_buf(),
        };

        self.process(path)
    }

    fn process(&self, path: &Path) -> HandleResult {
        // Let the writing application finish flushing before we read.
        std::thread::sleep(self.config.settle_delay());

        let key = BaselineStore::key_for(path);
        let key_lock = self.context.lock_key(&key);
        let _key_guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut attempt = 0u32;
        loop {
            // Publish the marker so the timeout monitor sees live reads
            // the same way it sees batch reads.
            self.context.begin(path);
            let result = sync_baseline(
                &self.source,
                path,
                self.cache.as_ref(),
                &self.store,
                &self.sink,
                self.config.diff_mode,
                false,
            );
            if !self.context.finish(path) {
                log::warn!("read of {} overran its time ceiling", path.display());
            }
            match result {
                Ok(report) => return HandleResult::Done(report),
                Err(WatchError::Read(err))
                    if err.is_transient() && attempt < self.config.retry_count =>
                {
                    attempt += 1;
                    log::info!(
                        "{} is locked, retry {attempt} of {}",
                        path.display(),
                        self.config.retry_count
                    );
                    std::thread::sleep(self.config.retry_delay());
                }
                Err(err) => {
                    log::warn!("abandoning event for {}: {err}", path.display());
                    return HandleResult::Abandoned;
                }
            }
        }
    }
}

/// Removes the path from the in-flight set on every exit path
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Blocking watch loop over the configured roots
pub struct WatchService<S> {
    handler: ChangeHandler<S>,
    roots: Vec<PathBuf>,
    context: Arc<ScanContext>,
}

impl<S: SnapshotSource> WatchService<S> {
    pub fn new(source: S, config: WatchConfig) -> Self {
        Self::with_context(source, config, Arc::new(ScanContext::new()))
    }

    /// Build against an existing context, typically one shared with a
    /// batch [`crate::ScanSupervisor`] over the same store
    pub fn with_context(source: S, config: WatchConfig, context: Arc<ScanContext>) -> Self {
        let roots = config.roots.clone();
        WatchService {
            handler: ChangeHandler::with_context(source, config, context.clone()),
            roots,
            context,
        }
    }

    /// Shared context handle, for wiring a stop signal
    pub fn context(&self) -> Arc<ScanContext> {
        self.context.clone()
    }

    /// Watch until the stop flag trips or the watcher channel closes
    pub fn run(&self) -> WatchResult<()> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;
        for root in &self.roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            log::info!("watching {}", root.display());
        }

        loop {
            if self.context.stop_requested() {
                log::info!("stop requested, leaving watch loop");
                return Ok(());
            }
            match rx.recv_timeout(Duration::from_millis(250)) {
                Ok(Ok(event)) => {
                    if matches!(event.kind, EventKind::Modify(_)) {
                        for path in &event.paths {
                            self.handler.handle_modify(path);
                        }
                    }
                }
                Ok(Err(err)) => log::warn!("watch error: {err}"),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }
}
