//! Workbook package metadata
//!
//! Resolves worksheet part paths, collects array-formula anchors, and reads
//! the last-modified-by author. This is the adapter-boundary capability pass
//! that lets captured cells arrive at the normalizer already tagged.

use std::collections::BTreeMap;
use std::io::{BufReader, Read, Seek};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::links::local_name;

/// A worksheet and the package part that stores it
#[derive(Debug, Clone, PartialEq)]
pub struct SheetPart {
    pub name: String,
    pub path: String,
}

/// Resolve worksheet names to part paths via workbook.xml and its rels
pub fn sheet_parts<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> XlsxResult<Vec<SheetPart>> {
    let sheet_info = read_workbook_sheets(archive)?;
    let rels = read_worksheet_rels(archive)?;

    Ok(sheet_info
        .into_iter()
        .filter_map(|(name, r_id)| {
            rels.get(&r_id).map(|path| SheetPart {
                name,
                path: path.clone(),
            })
        })
        .collect())
}

/// Read workbook.xml to get sheet names and rIds
fn read_workbook_sheets<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> XlsxResult<Vec<(String, String)>> {
    let file = archive
        .by_name("xl/workbook.xml")
        .map_err(|_| XlsxError::MissingPart("xl/workbook.xml".into()))?;

    let reader = BufReader::new(file);
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut r_id = None;

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => {
                            name = attr.unescape_value().ok().map(|s| s.to_string());
                        }
                        b"r:id" => {
                            r_id = attr.unescape_value().ok().map(|s| s.to_string());
                        }
                        _ => {}
                    }
                }

                if let (Some(name), Some(r_id)) = (name, r_id) {
                    sheets.push((name, r_id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// Read workbook.xml.rels to get worksheet part paths
fn read_worksheet_rels<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> XlsxResult<BTreeMap<String, String>> {
    let file = archive
        .by_name("xl/_rels/workbook.xml.rels")
        .map_err(|_| XlsxError::MissingPart("xl/_rels/workbook.xml.rels".into()))?;

    let reader = BufReader::new(file);
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut rels = BTreeMap::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                let mut rel_type = None;

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => {
                            id = attr.unescape_value().ok().map(|s| s.to_string());
                        }
                        b"Target" => {
                            target = attr.unescape_value().ok().map(|s| s.to_string());
                        }
                        b"Type" => {
                            rel_type = attr.unescape_value().ok().map(|s| s.to_string());
                        }
                        _ => {}
                    }
                }

                if let (Some(id), Some(target), Some(rel_type)) = (id, target, rel_type) {
                    if rel_type.ends_with("/worksheet") {
                        // Target is relative to xl/ unless absolute
                        let full_path = if let Some(stripped) = target.strip_prefix('/') {
                            stripped.to_string()
                        } else {
                            format!("xl/{}", target)
                        };
                        rels.insert(id, full_path);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Collect array-formula anchors for one worksheet part.
///
/// Returns anchor coordinate → formula text for every `<f t="array">`
/// element, so the snapshot builder can tag those captures explicitly.
pub fn array_formula_anchors<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    part_path: &str,
) -> XlsxResult<BTreeMap<String, String>> {
    let file = archive
        .by_name(part_path)
        .map_err(|_| XlsxError::MissingPart(part_path.to_string()))?;

    let reader = BufReader::new(file);
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut anchors = BTreeMap::new();

    let mut current_cell: Option<String> = None;
    let mut in_array_formula = false;
    let mut formula_text = String::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"c" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"r" {
                        current_cell = attr.unescape_value().ok().map(|s| s.to_string());
                    }
                }
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"f" => {
                let is_array = e.attributes().flatten().any(|attr| {
                    attr.key.as_ref() == b"t" && attr.value.as_ref() == b"array"
                });
                if is_array {
                    in_array_formula = true;
                    formula_text.clear();
                }
            }
            Ok(Event::Text(e)) if in_array_formula => {
                if let Ok(text) = e.unescape() {
                    formula_text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"f" if in_array_formula => {
                    if let Some(cell) = &current_cell {
                        if !formula_text.is_empty() {
                            anchors.insert(cell.clone(), formula_text.clone());
                        }
                    }
                    in_array_formula = false;
                }
                b"c" => {
                    current_cell = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(anchors)
}

/// Last-modified-by author from docProps/core.xml, if present
pub fn last_author<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Option<String> {
    let file = archive.by_name("docProps/core.xml").ok()?;

    let reader = BufReader::new(file);
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_author = false;
    let mut author = String::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if local_name(e.name().as_ref()) == b"lastModifiedBy" => {
                in_author = true;
            }
            Ok(Event::Text(e)) if in_author => {
                if let Ok(text) = e.unescape() {
                    author.push_str(&text);
                }
            }
            Ok(Event::End(e)) if local_name(e.name().as_ref()) == b"lastModifiedBy" => break,
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    if author.is_empty() {
        None
    } else {
        Some(author)
    }
}
