//! Error types for cellwatch-core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cellwatch-core
#[derive(Debug, Error)]
pub enum Error {
    /// A document could not be read into a snapshot
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a read error for the given document path
    pub fn read<S: Into<String>>(path: impl Into<PathBuf>, reason: S) -> Self {
        Error::Read {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Whether this error looks like a transient file-lock condition.
    ///
    /// Network shares and Office applications hold exclusive locks while
    /// flushing; such reads succeed when retried after a short delay.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Read { reason, .. } => {
                let reason = reason.to_ascii_lowercase();
                reason.contains("lock")
                    || reason.contains("denied")
                    || reason.contains("in use")
                    || reason.contains("sharing violation")
            }
            Error::Other(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_detection() {
        assert!(Error::read("a.xlsx", "permission denied (os error 13)").is_transient());
        assert!(Error::read("a.xlsx", "file is LOCKED by another process").is_transient());
        assert!(!Error::read("a.xlsx", "invalid zip archive").is_transient());
        assert!(!Error::other("boom").is_transient());
    }
}
