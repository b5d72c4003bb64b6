//! Canonical cell records

use std::fmt;

use serde::{Deserialize, Serialize};

/// A canonical printable cell value.
///
/// Timestamps are carried as ISO-8601 strings, so every variant serializes
/// to a bare JSON scalar (or `null`) in persisted baselines. No variant ever
/// holds an object identity or any other representation artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// No value
    Null,
    /// Boolean value (TRUE/FALSE)
    Bool(bool),
    /// Numeric value (all numbers stored as f64)
    Number(f64),
    /// String value, including ISO-8601 timestamp strings
    Text(String),
}

impl Scalar {
    /// Create a text scalar
    pub fn text<S: Into<String>>(s: S) -> Self {
        Scalar::Text(s.into())
    }

    /// Check whether this is the null scalar
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::Null
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, ""),
            Scalar::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::text(s)
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// Canonical (formula, value) pair recorded for a single cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellRecord {
    /// Formula text with a leading `=`, if the cell holds a formula
    pub formula: Option<String>,
    /// Canonical cell value
    pub value: Scalar,
}

impl CellRecord {
    /// Record for a plain value cell
    pub fn value(value: impl Into<Scalar>) -> Self {
        CellRecord {
            formula: None,
            value: value.into(),
        }
    }

    /// Record for a formula cell with an optional cached value
    pub fn formula<S: Into<String>>(formula: S, value: impl Into<Scalar>) -> Self {
        CellRecord {
            formula: Some(formula.into()),
            value: value.into(),
        }
    }

    /// The `{formula: null, value: null}` record used for absent cells
    pub fn absent() -> Self {
        CellRecord::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalar_serializes_to_bare_json() {
        assert_eq!(serde_json::to_string(&Scalar::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Scalar::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Scalar::Number(10.0)).unwrap(), "10.0");
        assert_eq!(
            serde_json::to_string(&Scalar::text("hi")).unwrap(),
            "\"hi\""
        );
    }

    #[test]
    fn test_scalar_roundtrip() {
        for json in ["null", "true", "3.5", "\"2025-07-10T16:29:38\""] {
            let scalar: Scalar = serde_json::from_str(json).unwrap();
            let back = serde_json::to_string(&scalar).unwrap();
            let reparsed: Scalar = serde_json::from_str(&back).unwrap();
            assert_eq!(scalar, reparsed);
        }
    }

    #[test]
    fn test_record_json_shape() {
        let record = CellRecord::formula("=SUM(A1:A3)", 10.0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["formula"], "=SUM(A1:A3)");
        assert_eq!(json["value"], 10.0);

        let absent = serde_json::to_value(CellRecord::absent()).unwrap();
        assert_eq!(absent["formula"], serde_json::Value::Null);
        assert_eq!(absent["value"], serde_json::Value::Null);
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Null.to_string(), "");
        assert_eq!(Scalar::Bool(false).to_string(), "FALSE");
        assert_eq!(Scalar::Number(10.0).to_string(), "10");
        assert_eq!(Scalar::text("x").to_string(), "x");
    }
}
