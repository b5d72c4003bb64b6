//! # cellwatch-core
//!
//! Core data model and algorithms for cellwatch: canonical cell records,
//! content normalization, order-independent snapshot hashing, and the diff
//! engine that classifies cell-level changes between snapshots.
//!
//! The reader seam is the [`SnapshotSource`] trait; concrete adapters (such
//! as the XLSX adapter) tag each captured cell as a plain scalar, an
//! ordinary formula, or an array formula before handing it to
//! [`normalize`], so normalization never depends on runtime type inspection.

pub mod diff;
pub mod error;
pub mod normalize;
pub mod record;
pub mod snapshot;

pub use diff::{diff, filter_identity_artifacts, ChangeRecord, ChangeType, DiffMode};
pub use error::{Error, Result};
pub use normalize::{normalize, resolve_links, CapturedCell, ExternalLinkMap, RawScalar};
pub use record::{CellRecord, Scalar};
pub use snapshot::{content_hash, DocumentSnapshot, SheetMap, SheetSnapshot, SnapshotSource};
