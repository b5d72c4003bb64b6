//! Content normalization
//!
//! Turns a raw captured cell into a stable [`CellRecord`]. The capture is an
//! already-tagged union produced at the reader adapter boundary, so this
//! module never inspects runtime type names: two array-formula captures with
//! identical text normalize to equal records no matter how many times the
//! document was re-read or what transient identity each capture carried.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::record::{CellRecord, Scalar};

/// Mapping from a bracketed external-reference index to a target file path.
///
/// Built once per document read and discarded after formula resolution.
pub type ExternalLinkMap = BTreeMap<u32, String>;

/// A raw cell value as reported by the reader, before canonicalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawScalar {
    /// No value
    Empty,
    /// Boolean value
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// String value
    Text(String),
    /// Timestamp value, canonicalized to an ISO-8601 string
    Timestamp(NaiveDateTime),
}

/// A captured cell, tagged at the reader adapter boundary
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedCell {
    /// A plain value cell
    Scalar(RawScalar),
    /// An ordinary formula cell with its cached value
    FormulaText { formula: String, cached: RawScalar },
    /// A multi-cell (array) formula capture.
    ///
    /// `text` is the explicit formula text when the reader exposes one,
    /// `formula` a secondary formula field some captures carry instead, and
    /// `display` the printable rendering used as a last resort. Only the
    /// textual content participates in normalization.
    ArrayFormulaText {
        text: Option<String>,
        formula: Option<String>,
        display: String,
        cached: RawScalar,
    },
}

/// Canonicalize a raw scalar into its stable printable form
fn canonical_scalar(raw: RawScalar) -> Scalar {
    match raw {
        RawScalar::Empty => Scalar::Null,
        RawScalar::Bool(b) => Scalar::Bool(b),
        // Non-finite numbers cannot appear in the canonical JSON form, so
        // carry them as their printable rendering instead.
        RawScalar::Number(n) if !n.is_finite() => Scalar::Text(n.to_string()),
        RawScalar::Number(n) => Scalar::Number(n),
        RawScalar::Text(s) => Scalar::Text(s),
        RawScalar::Timestamp(ts) => Scalar::Text(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
    }
}

/// Normalize a captured cell into a canonical record
pub fn normalize(captured: CapturedCell, links: &ExternalLinkMap) -> CellRecord {
    match captured {
        CapturedCell::Scalar(raw) => CellRecord {
            formula: None,
            value: canonical_scalar(raw),
        },
        CapturedCell::FormulaText { formula, cached } => CellRecord {
            formula: Some(canonical_formula(&formula, links)),
            value: canonical_scalar(cached),
        },
        CapturedCell::ArrayFormulaText {
            text,
            formula,
            display,
            cached,
        } => {
            // Prefer the explicit text field, then the formula field, then
            // the printable rendering. The capture's identity never leaks
            // into the record.
            let content = text.or(formula).unwrap_or(display);
            CellRecord {
                formula: Some(canonical_formula(&content, links)),
                value: canonical_scalar(cached),
            }
        }
    }
}

/// Ensure a leading `=` and resolve bracketed external references
fn canonical_formula(formula: &str, links: &ExternalLinkMap) -> String {
    let trimmed = formula.trim();
    let prefixed = if trimmed.starts_with('=') {
        trimmed.to_owned()
    } else {
        format!("={trimmed}")
    };
    resolve_links(&prefixed, links)
}

static EXTERNAL_REF: Lazy<Regex> = Lazy::new(|| {
    // Matches `[<index>]<name>!` external workbook references.
    Regex::new(r"\[(\d+)\]([^!\[\]]+)!").expect("external reference pattern is valid")
});

/// Rewrite `[<index>]<name>!` references using the external link map.
///
/// Mapped indices are replaced by the target's base file name, e.g.
/// `[1]Sheet1!` becomes `[Source.xlsx]Sheet1!`. Indices absent from the map
/// are left verbatim, and no other part of the formula text is altered.
pub fn resolve_links(formula: &str, links: &ExternalLinkMap) -> String {
    if links.is_empty() {
        return formula.to_owned();
    }

    EXTERNAL_REF
        .replace_all(formula, |caps: &Captures<'_>| {
            let index: u32 = match caps[1].parse() {
                Ok(n) => n,
                Err(_) => return caps[0].to_owned(),
            };
            match links.get(&index) {
                Some(target) => format!("[{}]{}!", base_file_name(target), &caps[2]),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

/// Base file name of a target path, tolerating both path separators
fn base_file_name(target: &str) -> &str {
    target
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn no_links() -> ExternalLinkMap {
        ExternalLinkMap::new()
    }

    #[test]
    fn test_null_and_primitives_pass_through() {
        let links = no_links();
        assert_eq!(
            normalize(CapturedCell::Scalar(RawScalar::Empty), &links),
            CellRecord::value(Scalar::Null)
        );
        assert_eq!(
            normalize(CapturedCell::Scalar(RawScalar::Bool(true)), &links),
            CellRecord::value(true)
        );
        assert_eq!(
            normalize(CapturedCell::Scalar(RawScalar::Number(3.5)), &links),
            CellRecord::value(3.5)
        );
        assert_eq!(
            normalize(CapturedCell::Scalar(RawScalar::Text("hi".into())), &links),
            CellRecord::value("hi")
        );
    }

    #[test]
    fn test_timestamp_becomes_iso_8601() {
        let ts = NaiveDate::from_ymd_opt(2025, 7, 10)
            .unwrap()
            .and_hms_opt(16, 29, 38)
            .unwrap();
        let record = normalize(CapturedCell::Scalar(RawScalar::Timestamp(ts)), &no_links());
        assert_eq!(record.value, Scalar::text("2025-07-10T16:29:38"));
    }

    #[test]
    fn test_formula_gains_leading_equals() {
        let record = normalize(
            CapturedCell::FormulaText {
                formula: "SUM(A1:A3)".into(),
                cached: RawScalar::Number(6.0),
            },
            &no_links(),
        );
        assert_eq!(record.formula.as_deref(), Some("=SUM(A1:A3)"));
        assert_eq!(record.value, Scalar::Number(6.0));
    }

    #[test]
    fn test_array_captures_with_equal_text_normalize_equal() {
        // Two captures of the same array formula from separate reads carry
        // different printable renderings (the transient identity) but the
        // same text. The records must be equal.
        let links = no_links();
        let a = normalize(
            CapturedCell::ArrayFormulaText {
                text: Some("SUM(A1:A3)".into()),
                formula: None,
                display: "<ArrayFormula 'SUM(A1:A3)' at 0x7f3a2b4c>".into(),
                cached: RawScalar::Number(6.0),
            },
            &links,
        );
        let b = normalize(
            CapturedCell::ArrayFormulaText {
                text: Some("SUM(A1:A3)".into()),
                formula: None,
                display: "<ArrayFormula 'SUM(A1:A3)' at 0x55e9d1f0>".into(),
                cached: RawScalar::Number(6.0),
            },
            &links,
        );
        assert_eq!(a, b);
        assert_eq!(a.formula.as_deref(), Some("=SUM(A1:A3)"));
    }

    #[test]
    fn test_array_capture_field_preference() {
        let links = no_links();
        // text wins over formula
        let record = normalize(
            CapturedCell::ArrayFormulaText {
                text: Some("A1:A3*2".into()),
                formula: Some("ignored".into()),
                display: "ignored".into(),
                cached: RawScalar::Empty,
            },
            &links,
        );
        assert_eq!(record.formula.as_deref(), Some("=A1:A3*2"));

        // formula wins over display
        let record = normalize(
            CapturedCell::ArrayFormulaText {
                text: None,
                formula: Some("A1:A3*2".into()),
                display: "ignored".into(),
                cached: RawScalar::Empty,
            },
            &links,
        );
        assert_eq!(record.formula.as_deref(), Some("=A1:A3*2"));

        // display is the last resort
        let record = normalize(
            CapturedCell::ArrayFormulaText {
                text: None,
                formula: None,
                display: "A1:A3*2".into(),
                cached: RawScalar::Empty,
            },
            &links,
        );
        assert_eq!(record.formula.as_deref(), Some("=A1:A3*2"));
    }

    #[test]
    fn test_resolve_links_mapped_index() {
        let mut links = ExternalLinkMap::new();
        links.insert(1, r"C:\Data\Source.xlsx".to_string());
        assert_eq!(
            resolve_links("=[1]Sheet1!A1", &links),
            "=[Source.xlsx]Sheet1!A1"
        );
    }

    #[test]
    fn test_resolve_links_unmapped_index_left_verbatim() {
        let mut links = ExternalLinkMap::new();
        links.insert(1, r"C:\Data\Source.xlsx".to_string());
        assert_eq!(resolve_links("=[9]Sheet1!A1", &links), "=[9]Sheet1!A1");
    }

    #[test]
    fn test_resolve_links_rewrites_every_reference() {
        let mut links = ExternalLinkMap::new();
        links.insert(1, "/srv/data/Source.xlsx".to_string());
        links.insert(2, "Other.xlsx".to_string());
        assert_eq!(
            resolve_links("=SUM([1]Sheet1!A1:[1]Sheet1!A10)+[2]Data!B1", &links),
            "=SUM([Source.xlsx]Sheet1!A1:[Source.xlsx]Sheet1!A10)+[Other.xlsx]Data!B1"
        );
    }

    #[test]
    fn test_resolve_links_empty_map_is_identity() {
        assert_eq!(resolve_links("=[1]Sheet1!A1", &no_links()), "=[1]Sheet1!A1");
    }
}
