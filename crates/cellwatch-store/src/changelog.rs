//! Append-only change log
//!
//! One compressed CSV row per detected change. Every append writes a
//! self-contained gzip member to the end of the log file, so a crash between
//! appends never corrupts earlier records and standard multi-member gzip
//! readers see one continuous CSV stream.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;

use cellwatch_core::ChangeRecord;

use crate::error::StoreResult;

/// Append-only sink for detected changes
#[derive(Debug, Clone)]
pub struct ChangeLogSink {
    path: PathBuf,
}

impl ChangeLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ChangeLogSink { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row per change record for the document at `document_path`.
    ///
    /// Row layout: timestamp, file path, worksheet, cell, old formula,
    /// old value, new formula, new value, change type, author.
    pub fn append(
        &self,
        document_path: &Path,
        author: Option<&str>,
        changes: &[ChangeRecord],
    ) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(encoder);

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let document = document_path.to_string_lossy();
        for change in changes {
            writer.write_record([
                timestamp.as_str(),
                document.as_ref(),
                change.worksheet.as_str(),
                change.cell.as_str(),
                change.old_formula.as_deref().unwrap_or(""),
                &change.old_value.to_string(),
                change.new_formula.as_deref().unwrap_or(""),
                &change.new_value.to_string(),
                change.change_type.as_str(),
                author.unwrap_or(""),
            ])?;
        }

        let encoder = writer.into_inner().map_err(|err| err.into_error())?;
        encoder.finish()?.flush()?;
        Ok(())
    }
}
