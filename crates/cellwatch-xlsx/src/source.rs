//! Workbook snapshot adapter
//!
//! Reads a workbook with calamine and a parallel package pass, merges cached
//! values with formula text per coordinate, tags array-formula anchors, and
//! normalizes everything into a canonical [`DocumentSnapshot`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use cellwatch_core::{
    normalize, CapturedCell, DocumentSnapshot, Error, ExternalLinkMap, RawScalar, Result, SheetMap,
    SheetSnapshot, SnapshotSource,
};

use crate::error::XlsxResult;
use crate::links::extract_links_from_archive;
use crate::parts::{self, sheet_parts};

/// Snapshot source backed by on-disk `.xlsx`/`.xlsm` workbooks
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxSnapshotSource;

impl XlsxSnapshotSource {
    pub fn new() -> Self {
        XlsxSnapshotSource
    }

    fn read_snapshot(&self, path: &Path) -> XlsxResult<DocumentSnapshot> {
        // Package pass: external links and array-formula anchors come from
        // the raw parts, which calamine does not expose.
        let (links, anchors_by_sheet) = read_package_metadata(path);

        let mut workbook = open_workbook_auto(path)?;
        let sheet_names = workbook.sheet_names().to_owned();

        let mut sheets = SheetMap::new();
        for sheet_name in sheet_names {
            let range = workbook.worksheet_range(&sheet_name)?;

            // coordinate -> (cached value, formula text)
            let mut cells: BTreeMap<String, (RawScalar, Option<String>)> = BTreeMap::new();

            let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
            for (row, col, data) in range.cells() {
                let raw = raw_scalar(data);
                if matches!(raw, RawScalar::Empty) {
                    continue;
                }
                let coord = cell_name(row_offset + row as u32, col_offset + col as u32);
                cells.insert(coord, (raw, None));
            }

            // Formula ranges may be absent for some formats; treat as optional.
            if let Ok(formulas) = workbook.worksheet_formula(&sheet_name) {
                let (row_offset, col_offset) = formulas.start().unwrap_or((0, 0));
                for (row, col, formula) in formulas.cells() {
                    if formula.trim().is_empty() {
                        continue;
                    }
                    let coord = cell_name(row_offset + row as u32, col_offset + col as u32);
                    cells
                        .entry(coord)
                        .or_insert((RawScalar::Empty, None))
                        .1 = Some(formula.clone());
                }
            }

            let anchors = anchors_by_sheet.get(&sheet_name);
            let mut sheet = SheetSnapshot::new();
            for (coord, (raw, formula)) in cells {
                let captured = match anchors.and_then(|a| a.get(&coord)) {
                    Some(text) => CapturedCell::ArrayFormulaText {
                        text: Some(text.clone()),
                        formula,
                        display: text.clone(),
                        cached: raw,
                    },
                    None => match formula {
                        Some(formula) => CapturedCell::FormulaText {
                            formula,
                            cached: raw,
                        },
                        None => CapturedCell::Scalar(raw),
                    },
                };
                sheet.insert(coord, normalize(captured, &links));
            }

            if !sheet.is_empty() {
                sheets.insert(sheet_name, sheet);
            }
        }

        Ok(DocumentSnapshot::from_sheets(sheets))
    }
}

impl SnapshotSource for XlsxSnapshotSource {
    fn snapshot(&self, path: &Path) -> Result<DocumentSnapshot> {
        self.read_snapshot(path)
            .map_err(|err| Error::read(path, err.to_string()))
    }

    fn last_author(&self, path: &Path) -> Option<String> {
        let file = File::open(path).ok()?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file)).ok()?;
        parts::last_author(&mut archive)
    }
}

type SheetAnchors = BTreeMap<String, BTreeMap<String, String>>;

/// External link map plus per-sheet array-formula anchors.
///
/// Metadata extraction is best-effort: a workbook whose parts cannot be read
/// here will still fail loudly in the calamine pass if it is truly broken.
fn read_package_metadata(path: &Path) -> (ExternalLinkMap, SheetAnchors) {
    let mut anchors_by_sheet = SheetAnchors::new();

    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return (ExternalLinkMap::new(), anchors_by_sheet),
    };
    let mut archive = match zip::ZipArchive::new(BufReader::new(file)) {
        Ok(archive) => archive,
        Err(_) => return (ExternalLinkMap::new(), anchors_by_sheet),
    };

    let links = extract_links_from_archive(&mut archive).unwrap_or_default();

    for part in sheet_parts(&mut archive).unwrap_or_default() {
        match parts::array_formula_anchors(&mut archive, &part.path) {
            Ok(anchors) if !anchors.is_empty() => {
                anchors_by_sheet.insert(part.name, anchors);
            }
            Ok(_) => {}
            Err(err) => {
                log::debug!("skipping anchor scan for {}: {err}", part.path);
            }
        }
    }

    (links, anchors_by_sheet)
}

/// Convert a calamine cell value into the raw capture form
fn raw_scalar(data: &Data) -> RawScalar {
    match data {
        Data::Empty => RawScalar::Empty,
        Data::String(s) => RawScalar::Text(s.clone()),
        Data::Float(f) => RawScalar::Number(*f),
        Data::Int(i) => RawScalar::Number(*i as f64),
        Data::Bool(b) => RawScalar::Bool(*b),
        Data::Error(e) => RawScalar::Text(e.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => RawScalar::Timestamp(ts),
            None => RawScalar::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => RawScalar::Text(s.clone()),
        Data::DurationIso(s) => RawScalar::Text(s.clone()),
    }
}

/// `A1`-style name for a zero-based (row, column) pair
fn cell_name(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}
