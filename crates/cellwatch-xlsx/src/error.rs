//! Error types for cellwatch-xlsx

use thiserror::Error;

/// Result type alias using [`XlsxError`]
pub type XlsxResult<T> = std::result::Result<T, XlsxError>;

/// Errors that can occur while reading XLSX documents
#[derive(Debug, Error)]
pub enum XlsxError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Spreadsheet reader error
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// A required package part is missing
    #[error("missing part: {0}")]
    MissingPart(String),
}
