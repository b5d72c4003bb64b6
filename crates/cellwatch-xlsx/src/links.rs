//! External link extraction
//!
//! Builds the index→path map that lets the normalizer rewrite bracketed
//! `[n]Sheet!` references into readable file names. The map is built from
//! the workbook-level relationship definitions plus the
//! `xl/externalLinks/externalLink<N>.xml` parts.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use cellwatch_core::ExternalLinkMap;

use crate::error::XlsxResult;

/// Extract the external link map for the document at `path`.
///
/// Extraction never fails: malformed individual entries are skipped, and any
/// overall failure yields the empty map (the document is then processed
/// without reference rewriting).
pub fn extract_links(path: &Path) -> ExternalLinkMap {
    match try_extract_links(path) {
        Ok(map) => map,
        Err(err) => {
            log::debug!("external link extraction failed for {}: {err}", path.display());
            ExternalLinkMap::new()
        }
    }
}

fn try_extract_links(path: &Path) -> XlsxResult<ExternalLinkMap> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    extract_links_from_archive(&mut archive)
}

/// Extract the external link map from an already-open archive
pub fn extract_links_from_archive<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> XlsxResult<ExternalLinkMap> {
    let mut map = ExternalLinkMap::new();

    // Cheap fast path: no external-link definition parts, no work.
    let mut link_parts: Vec<String> = archive
        .file_names()
        .filter(|name| is_external_link_part(name))
        .map(String::from)
        .collect();
    if link_parts.is_empty() {
        return Ok(map);
    }
    // First-seen order must be stable across reads; zip iteration order is
    // not guaranteed, so order by name.
    link_parts.sort();

    let rels_part = match archive
        .file_names()
        .find(|name| name.ends_with("workbook.xml.rels"))
        .map(String::from)
    {
        Some(name) => name,
        None => return Ok(map),
    };

    let targets = {
        let entry = archive.by_name(&rels_part)?;
        read_external_link_targets(BufReader::new(entry))?
    };

    for (seq, part) in link_parts.iter().enumerate() {
        let index = index_from_part_name(part).unwrap_or(seq as u32 + 1);

        let entry = match archive.by_name(part) {
            Ok(entry) => entry,
            Err(err) => {
                log::debug!("skipping unreadable external link part {part}: {err}");
                continue;
            }
        };

        let rel_id = match read_external_book_rel_id(BufReader::new(entry)) {
            Ok(Some(id)) => id,
            Ok(None) => continue,
            Err(err) => {
                log::debug!("skipping malformed external link part {part}: {err}");
                continue;
            }
        };

        if let Some(target) = targets.get(&rel_id) {
            // A repeated index is overwritten (last-write-wins); an index is
            // never invented when the relationship id cannot be resolved.
            map.insert(index, target.clone());
        }
    }

    Ok(map)
}

fn is_external_link_part(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("externallink") && lower.ends_with(".xml") && !lower.contains("_rels")
}

/// The `<N>` sequence number from an `externalLink<N>.xml` part name
fn index_from_part_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let start = lower.rfind("externallink")? + "externallink".len();
    let digits: String = lower[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Relationship id → target path, for external-link-typed relationships only
fn read_external_link_targets<R: Read>(reader: R) -> XlsxResult<HashMap<String, String>> {
    let reader = BufReader::new(reader);
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut targets = HashMap::new();

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
                    if rel_type.contains("externalLink") {
                        targets.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

/// The `r:id` of the external-book reference inside an external link part
fn read_external_book_rel_id<R: Read>(reader: R) -> XlsxResult<Option<String>> {
    let reader = BufReader::new(reader);
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.trim_text(true);

    let mut buf = Vec::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"externalBook" =>
            {
                for attr in e.attributes().flatten() {
                    if local_name(attr.key.as_ref()) == b"id" {
                        return Ok(attr.unescape_value().ok().map(|s| s.to_string()));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

/// Strip any namespace prefix from a qualified XML name
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_archive(parts: &[(&str, &str)]) -> zip::ZipArchive<std::io::Cursor<Vec<u8>>> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in parts {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        zip::ZipArchive::new(std::io::Cursor::new(buf)).unwrap()
    }

    const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/externalLink" Target="C:\Data\Source.xlsx"/>
</Relationships>"#;

    const EXTERNAL_LINK_1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<externalLink xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <externalBook r:id="rId7"/>
</externalLink>"#;

    #[test]
    fn test_extract_links_maps_index_to_target() {
        let mut archive = build_archive(&[
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/externalLinks/externalLink1.xml", EXTERNAL_LINK_1),
        ]);
        let map = extract_links_from_archive(&mut archive).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1).map(String::as_str), Some(r"C:\Data\Source.xlsx"));
    }

    #[test]
    fn test_extract_links_no_definitions_fast_path() {
        let mut archive = build_archive(&[("xl/_rels/workbook.xml.rels", WORKBOOK_RELS)]);
        let map = extract_links_from_archive(&mut archive).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_extract_links_skips_malformed_entries() {
        let mut archive = build_archive(&[
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/externalLinks/externalLink1.xml", "<not-closed"),
            ("xl/externalLinks/externalLink2.xml", EXTERNAL_LINK_1),
        ]);
        let map = extract_links_from_archive(&mut archive).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&2).map(String::as_str), Some(r"C:\Data\Source.xlsx"));
    }

    #[test]
    fn test_extract_links_unresolvable_rel_id_invents_nothing() {
        let external = EXTERNAL_LINK_1.replace("rId7", "rId99");
        let mut archive = build_archive(&[
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/externalLinks/externalLink1.xml", external.as_str()),
        ]);
        let map = extract_links_from_archive(&mut archive).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_extract_links_missing_rels_returns_empty() {
        let mut archive = build_archive(&[("xl/externalLinks/externalLink1.xml", EXTERNAL_LINK_1)]);
        let map = extract_links_from_archive(&mut archive).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_index_from_part_name() {
        assert_eq!(
            index_from_part_name("xl/externalLinks/externalLink12.xml"),
            Some(12)
        );
        assert_eq!(index_from_part_name("xl/externalLinks/externalLink.xml"), None);
    }
}
