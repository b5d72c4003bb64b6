//! Baseline persistence
//!
//! One compressed JSON record per document key, replaced wholesale on every
//! detected change. The key is the document's base file name: two watched
//! folders containing same-named files share a baseline slot. This is a
//! known limitation of the key scheme, kept for on-disk compatibility with
//! existing baseline directories.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use cellwatch_core::{DocumentSnapshot, SheetMap};

use crate::error::StoreResult;

/// The last known canonical state of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub last_author: Option<String>,
    pub content_hash: String,
    pub cells: SheetMap,
}

impl Baseline {
    /// Build a baseline from a freshly captured snapshot
    pub fn from_snapshot(snapshot: &DocumentSnapshot, last_author: Option<String>) -> Self {
        Baseline {
            last_author,
            content_hash: snapshot.content_hash.clone(),
            cells: snapshot.sheets.clone(),
        }
    }
}

/// Directory-backed baseline store, one `<key>.baseline.json.gz` per key
#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        BaselineStore { dir: dir.into() }
    }

    /// Stable storage key for a document path: its base file name
    pub fn key_for(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.baseline.json.gz"))
    }

    /// Load the baseline for `key`.
    ///
    /// A missing file is a normal first-observation case; a corrupt file is
    /// logged and treated the same way, so the document is re-baselined on
    /// its next successful read.
    pub fn load(&self, key: &str) -> Option<Baseline> {
        let path = self.file_for(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(_) => return None,
        };

        let decoder = GzDecoder::new(BufReader::new(file));
        match serde_json::from_reader(decoder) {
            Ok(baseline) => Some(baseline),
            Err(err) => {
                log::warn!("discarding corrupt baseline {}: {err}", path.display());
                None
            }
        }
    }

    /// Persist the baseline for `key`, replacing any prior record.
    ///
    /// The record is written to a sibling temp file and renamed into place,
    /// so a reader never observes a half-written baseline.
    pub fn save(&self, key: &str, baseline: &Baseline) -> StoreResult<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.file_for(key);
        let tmp = path.with_extension("tmp");
        let file = File::create(&tmp)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, baseline)?;
        encoder.finish()?.flush()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellwatch_core::{CellRecord, SheetSnapshot};
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn sample_baseline() -> Baseline {
        let mut sheet = SheetSnapshot::new();
        sheet.insert("A1".into(), CellRecord::value(10.0));
        sheet.insert("B2".into(), CellRecord::formula("=A1*2", 20.0));
        let mut sheets = SheetMap::new();
        sheets.insert("Sheet1".into(), sheet);

        let snapshot = DocumentSnapshot::from_sheets(sheets);
        Baseline::from_snapshot(&snapshot, Some("alice".into()))
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path());

        let baseline = sample_baseline();
        store.save("Report.xlsx", &baseline).unwrap();
        assert_eq!(store.load("Report.xlsx"), Some(baseline));
    }

    #[test]
    fn test_load_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path());
        assert_eq!(store.load("absent.xlsx"), None);
    }

    #[test]
    fn test_load_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path());

        let mut file = File::create(dir.path().join("bad.xlsx.baseline.json.gz")).unwrap();
        file.write_all(b"this is not gzip").unwrap();
        assert_eq!(store.load("bad.xlsx"), None);
    }

    #[test]
    fn test_save_overwrites_prior_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path());

        let first = sample_baseline();
        store.save("Report.xlsx", &first).unwrap();

        let mut second = first.clone();
        second.last_author = Some("bob".into());
        store.save("Report.xlsx", &second).unwrap();

        assert_eq!(store.load("Report.xlsx"), Some(second));
    }

    #[test]
    fn test_key_for_uses_base_file_name() {
        assert_eq!(
            BaselineStore::key_for(Path::new("/srv/watch/a/Report.xlsx")),
            "Report.xlsx"
        );
        // Same-named files in different folders collide on purpose.
        assert_eq!(
            BaselineStore::key_for(Path::new("/srv/watch/b/Report.xlsx")),
            "Report.xlsx"
        );
    }
}
