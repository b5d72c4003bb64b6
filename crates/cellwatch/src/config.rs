//! Watch/scan configuration

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cellwatch_core::DiffMode;

use crate::error::{WatchError, WatchResult};

/// Configuration shared by the scan supervisor and the live watcher.
///
/// Every field has a default, so a config file only names what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Files or directories to scan/watch
    pub roots: Vec<PathBuf>,
    /// Directory holding per-document baseline records
    pub baseline_dir: PathBuf,
    /// Append-only change log file
    pub change_log: PathBuf,
    /// Resumable scan position file
    pub progress_file: PathBuf,
    /// Comparison mode for the diff engine
    pub diff_mode: DiffMode,
    /// Watched file extensions (case-insensitive)
    pub extensions: Vec<String>,
    /// Case-insensitive substrings that force-skip a path
    pub skip_patterns: Vec<String>,
    /// Delay before reading a freshly modified file, milliseconds
    pub settle_delay_ms: u64,
    /// Retry attempts for lock-style transient read errors
    pub retry_count: u32,
    /// Delay between retries, milliseconds
    pub retry_delay_ms: u64,
    /// Advisory per-file read ceiling, seconds; 0 disables the monitor
    pub read_timeout_secs: u64,
    /// Process memory ceiling, megabytes; 0 disables the guard
    pub memory_ceiling_mb: u64,
    /// Copy documents into a local folder before reading; speeds up
    /// repeated reads of files on network shares
    pub use_local_cache: bool,
    /// Folder holding the local copies
    pub cache_dir: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            roots: Vec::new(),
            baseline_dir: PathBuf::from("baselines"),
            change_log: PathBuf::from("changes.csv.gz"),
            progress_file: PathBuf::from("scan_progress.json"),
            diff_mode: DiffMode::FormulaOnly,
            extensions: vec!["xlsx".into(), "xlsm".into()],
            skip_patterns: Vec::new(),
            settle_delay_ms: 2000,
            retry_count: 3,
            retry_delay_ms: 1000,
            read_timeout_secs: 300,
            memory_ceiling_mb: 1024,
            use_local_cache: false,
            cache_dir: PathBuf::from("excel_cache"),
        }
    }
}

impl WatchConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> WatchResult<Self> {
        let file = File::open(path)
            .map_err(|err| WatchError::Config(format!("{}: {err}", path.display())))?;
        serde_json::from_reader(file)
            .map_err(|err| WatchError::Config(format!("{}: {err}", path.display())))
    }

    /// Whether the path carries a watched extension
    pub fn is_watched_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Whether any skip pattern matches the path (case-insensitive substring)
    pub fn matches_skip(&self, path: &Path) -> bool {
        if self.skip_patterns.is_empty() {
            return false;
        }
        let haystack = path.to_string_lossy().to_ascii_lowercase();
        self.skip_patterns
            .iter()
            .any(|pattern| haystack.contains(&pattern.to_ascii_lowercase()))
    }

    /// Whether the path looks like an editor lock/temp artifact (`~$...`)
    pub fn is_lock_artifact(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.starts_with("~$") || name.ends_with(".tmp")
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}
