//! Diff engine: change detection and classification between snapshots

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::record::{CellRecord, Scalar};
use crate::snapshot::SheetMap;

/// Comparison mode for the diff engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    /// Emit a change only when the formula differs
    FormulaOnly,
    /// Emit a change when the full (formula, value) record differs
    Full,
}

/// Classification of a single cell change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Only the formula differs
    Formula,
    /// Only the value differs
    Value,
    /// Both formula and value differ
    Both,
}

impl ChangeType {
    /// Display string used in change-log records
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Formula => "formula",
            ChangeType::Value => "value",
            ChangeType::Both => "both",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected cell change. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub worksheet: String,
    pub cell: String,
    pub old_formula: Option<String>,
    pub old_value: Scalar,
    pub new_formula: Option<String>,
    pub new_value: Scalar,
    pub change_type: ChangeType,
}

/// Compute the set of changed cells between two snapshots.
///
/// The union of `(worksheet, cell)` keys over both sides is walked in sorted
/// order, so the output is deterministic for identical inputs. Cells absent
/// on one side compare as `{formula: null, value: null}`.
pub fn diff(old: &SheetMap, new: &SheetMap, mode: DiffMode) -> Vec<ChangeRecord> {
    let mut keys: BTreeSet<(&str, &str)> = BTreeSet::new();
    for (sheet, cells) in old {
        for coord in cells.keys() {
            keys.insert((sheet.as_str(), coord.as_str()));
        }
    }
    for (sheet, cells) in new {
        for coord in cells.keys() {
            keys.insert((sheet.as_str(), coord.as_str()));
        }
    }

    let absent = CellRecord::absent();
    let mut changes = Vec::new();

    for (sheet, coord) in keys {
        let old_cell = old
            .get(sheet)
            .and_then(|cells| cells.get(coord))
            .unwrap_or(&absent);
        let new_cell = new
            .get(sheet)
            .and_then(|cells| cells.get(coord))
            .unwrap_or(&absent);

        let change_type = match mode {
            DiffMode::FormulaOnly => {
                if old_cell.formula == new_cell.formula {
                    continue;
                }
                ChangeType::Formula
            }
            DiffMode::Full => {
                if old_cell == new_cell {
                    continue;
                }
                let formula_changed = old_cell.formula != new_cell.formula;
                let value_changed = old_cell.value != new_cell.value;
                match (formula_changed, value_changed) {
                    (true, false) => ChangeType::Formula,
                    (false, true) => ChangeType::Value,
                    _ => ChangeType::Both,
                }
            }
        };

        changes.push(ChangeRecord {
            worksheet: sheet.to_string(),
            cell: coord.to_string(),
            old_formula: old_cell.formula.clone(),
            old_value: old_cell.value.clone(),
            new_formula: new_cell.formula.clone(),
            new_value: new_cell.value.clone(),
            change_type,
        });
    }

    changes
}

static ARRAY_FORMULA_RENDERING: Lazy<Regex> = Lazy::new(|| {
    // `<ArrayFormula 'SUM(A1:A3)' (A1:B2)>` style printable renderings.
    Regex::new(r"<ArrayFormula\s+'([^']+)'\s*\([^)]*\)>").expect("artifact pattern is valid")
});

static ADDRESS_RENDERING: Lazy<Regex> = Lazy::new(|| {
    // `<... object at 0x7f3a...>` style identity-bearing renderings.
    Regex::new(r"<[^<>]*\bat\s+0x[0-9a-fA-F]+>").expect("address pattern is valid")
});

/// Extract the formula content from an identity-bearing rendering, if any
fn scrub_identity_artifact(formula: &str) -> String {
    if let Some(caps) = ARRAY_FORMULA_RENDERING.captures(formula) {
        let inner = &caps[1];
        return if inner.starts_with('=') {
            inner.to_owned()
        } else {
            format!("={inner}")
        };
    }
    formula.to_owned()
}

fn carries_address_artifact(formula: &str) -> bool {
    ADDRESS_RENDERING.is_match(formula)
}

/// Drop changes caused only by identity-bearing representation artifacts.
///
/// Safety net behind the normalizer: when both raw textual captures scrub to
/// the same content and the already-normalized values are equal, the change
/// is a false positive and is removed. This never suppresses a change whose
/// value fields differ.
pub fn filter_identity_artifacts(changes: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
    changes
        .into_iter()
        .filter(|change| {
            let (Some(old_f), Some(new_f)) = (&change.old_formula, &change.new_formula) else {
                return true;
            };
            if change.old_value != change.new_value {
                return true;
            }
            if scrub_identity_artifact(old_f) == scrub_identity_artifact(new_f) {
                return false;
            }
            // Unextractable address-bearing renderings on both sides with
            // equal values are identity churn as well.
            !(carries_address_artifact(old_f) && carries_address_artifact(new_f))
        })
        .collect()
}
