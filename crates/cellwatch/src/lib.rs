//! # cellwatch
//!
//! Cell-level spreadsheet change detection. Snapshots each watched
//! document's cell contents, compares against a stored baseline, and
//! appends structured change records when meaningful differences appear.
//!
//! Two entry points share one pipeline:
//! - [`ScanSupervisor`] walks a batch of files sequentially with resumable
//!   progress, a memory ceiling, and an advisory per-file read timeout.
//! - [`WatchService`] reacts to filesystem modify events with debouncing,
//!   a settle delay, and bounded retries on file locks.
//!
//! ```no_run
//! use cellwatch::{ScanSupervisor, WatchConfig};
//! use cellwatch_xlsx::XlsxSnapshotSource;
//!
//! let config = WatchConfig {
//!     roots: vec!["/srv/finance".into()],
//!     ..WatchConfig::default()
//! };
//! let supervisor = ScanSupervisor::new(XlsxSnapshotSource::new(), config);
//! let summary = supervisor.run();
//! println!("{} files scanned, {} changes", summary.processed, summary.changes);
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod supervisor;
pub mod watcher;

pub use cache::LocalCache;
pub use config::WatchConfig;
pub use context::{InFlight, KeyLocks, ScanContext};
pub use error::{WatchError, WatchResult};
pub use monitor::TimeoutMonitor;
pub use pipeline::{sync_baseline, SyncOutcome, SyncReport};
pub use supervisor::{BatchEnd, FileOutcome, ScanSummary, ScanSupervisor};
pub use watcher::{ChangeHandler, HandleResult, WatchService};

pub use cellwatch_core::{
    ChangeRecord, ChangeType, DiffMode, DocumentSnapshot, SnapshotSource,
};
pub use cellwatch_store::{Baseline, BaselineStore, ChangeLogSink, ProgressFile, ProgressState};
pub use cellwatch_xlsx::XlsxSnapshotSource;
