//! Scan progress persistence
//!
//! A tiny JSON file updated after every processed file, so an interrupted
//! batch resumes at the first unprocessed index. Removed on full-batch
//! completion.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Position of an in-flight batch scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// When this position was recorded (RFC 3339)
    pub timestamp: String,
    /// Number of files fully processed so far
    pub completed: usize,
    /// Total files in the batch
    pub total: usize,
}

impl ProgressState {
    pub fn now(completed: usize, total: usize) -> Self {
        ProgressState {
            timestamp: Utc::now().to_rfc3339(),
            completed,
            total,
        }
    }
}

/// On-disk handle for the progress file
#[derive(Debug, Clone)]
pub struct ProgressFile {
    path: PathBuf,
}

impl ProgressFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProgressFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved position; missing or corrupt files yield `None`
    pub fn load(&self) -> Option<ProgressState> {
        let file = File::open(&self.path).ok()?;
        match serde_json::from_reader(file) {
            Ok(state) => Some(state),
            Err(err) => {
                log::warn!(
                    "discarding corrupt progress file {}: {err}",
                    self.path.display()
                );
                None
            }
        }
    }

    pub fn save(&self, state: &ProgressState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        serde_json::to_writer(BufWriter::new(file), state)?;
        Ok(())
    }

    /// Remove the progress file after a fully completed batch
    pub fn clear(&self) -> StoreResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
