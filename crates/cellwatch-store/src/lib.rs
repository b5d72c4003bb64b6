//! # cellwatch-store
//!
//! Persistence layer for cellwatch: per-document baselines (compressed
//! JSON), the append-only compressed CSV change log, and the resumable scan
//! progress file.

pub mod baseline;
pub mod changelog;
pub mod error;
pub mod progress;

pub use baseline::{Baseline, BaselineStore};
pub use changelog::ChangeLogSink;
pub use error::{StoreError, StoreResult};
pub use progress::{ProgressFile, ProgressState};
