//! Canonical document snapshots and content hashing

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::record::CellRecord;

/// Sparse per-worksheet snapshot: cell coordinate (e.g. `"A1"`) to record
pub type SheetSnapshot = BTreeMap<String, CellRecord>;

/// Sparse worksheet-name-keyed cell map, the canonical serialized form
pub type SheetMap = BTreeMap<String, SheetSnapshot>;

/// A full canonical snapshot of one document.
///
/// Created fresh on every read and never mutated in place; a new snapshot
/// always replaces the prior one wholesale in the baseline store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Worksheet name to sparse cell map; empty worksheets are omitted
    pub sheets: SheetMap,
    /// Digest of the canonical serialized form of `sheets`
    pub content_hash: String,
    /// When this snapshot was captured
    pub captured_at: DateTime<Utc>,
}

impl DocumentSnapshot {
    /// Build a snapshot from a sheet map, computing its content hash
    pub fn from_sheets(sheets: SheetMap) -> Self {
        let content_hash = content_hash(&sheets);
        DocumentSnapshot {
            sheets,
            content_hash,
            captured_at: Utc::now(),
        }
    }

    /// An empty snapshot (no worksheets)
    pub fn empty() -> Self {
        Self::from_sheets(SheetMap::new())
    }

    /// Whether the snapshot recorded no cells at all
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Total number of recorded cells across all worksheets
    pub fn cell_count(&self) -> usize {
        self.sheets.values().map(|s| s.len()).sum()
    }
}

/// SHA-256 hex digest of the canonical serialized sheet map.
///
/// `BTreeMap` serializes worksheet names and cell coordinates in sorted
/// order, so the digest is invariant under the reader's iteration order.
pub fn content_hash(sheets: &SheetMap) -> String {
    // Scalars are canonicalized to finite values, so serialization of the
    // sheet map cannot fail.
    let bytes = serde_json::to_vec(sheets).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Source of document snapshots — the reader seam consumed by the scan
/// supervisor and the change notification handler.
pub trait SnapshotSource {
    /// Capture a full canonical snapshot of the document at `path`.
    ///
    /// A failed read must surface as an error, never as a silent empty
    /// snapshot that would look like "no changes".
    fn snapshot(&self, path: &Path) -> Result<DocumentSnapshot>;

    /// Last-modified-by author from the document's properties, if available
    fn last_author(&self, path: &Path) -> Option<String>;
}
