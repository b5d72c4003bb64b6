//! # cellwatch-xlsx
//!
//! XLSX (Office Open XML) snapshot adapter for cellwatch. Reads workbooks
//! into canonical document snapshots, including external link resolution and
//! array-formula anchor tagging.

pub mod error;
pub mod links;
pub mod parts;
pub mod source;

pub use error::{XlsxError, XlsxResult};
pub use links::extract_links;
pub use source::XlsxSnapshotSource;
