use std::io;
use std::path::PathBuf;

use crate::extract::ExtractionReport;

/// Failure tags used for assertions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedArchive,
    UnsupportedFeature,
    UnsupportedBackend,
    SizeMismatch,
    DecompressionError,
    PathTraversal,
    IoFailure,
    Cancelled,
    InvalidFilter,
    EntriesFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("unsupported backend '{name}' (available: {available})")]
    UnsupportedBackend { name: String, available: String },

    #[error("size mismatch for '{entry}': expected {expected} bytes, got {actual}")]
    SizeMismatch {
        entry: String,
        expected: u64,
        actual: u64,
    },

    #[error("decompression failed for '{entry}': {reason}")]
    Decompression { entry: String, reason: String },

    #[error("entry '{entry}' escapes the destination directory")]
    PathTraversal { entry: String },

    #[error("I/O failure on '{}': {source}", path.display())]
    IoAt { path: PathBuf, source: io::Error },

    #[error("extraction of '{entry}' was cancelled")]
    Cancelled { entry: String },

    #[error("invalid entry filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("{} of {} entries did not extract", .0.unfinished(), .0.total())]
    EntriesFailed(Box<ExtractionReport>),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedArchive(_) => ErrorKind::MalformedArchive,
            Error::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            Error::UnsupportedBackend { .. } => ErrorKind::UnsupportedBackend,
            Error::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Error::Decompression { .. } => ErrorKind::DecompressionError,
            Error::PathTraversal { .. } => ErrorKind::PathTraversal,
            Error::IoAt { .. } | Error::Io(_) => ErrorKind::IoFailure,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::InvalidFilter(_) => ErrorKind::InvalidFilter,
            Error::EntriesFailed(_) => ErrorKind::EntriesFailed,
        }
    }

    /// The aggregate report carried by a partially failed run.
    pub fn report(&self) -> Option<&ExtractionReport> {
        match self {
            Error::EntriesFailed(report) => Some(report),
            _ => None,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedArchive(msg.into())
    }

    pub(crate) fn io_at(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::IoAt { path, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_share_one_kind() {
        let plain = Error::from(io::Error::other("boom"));
        let located = Error::io_at("out/a.txt")(io::Error::other("boom"));
        assert_eq!(plain.kind(), ErrorKind::IoFailure);
        assert_eq!(located.kind(), ErrorKind::IoFailure);
        assert!(located.to_string().contains("out/a.txt"));
    }

    #[test]
    fn size_mismatch_message() {
        let err = Error::SizeMismatch {
            entry: "a.txt".into(),
            expected: 10,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "size mismatch for 'a.txt': expected 10 bytes, got 7"
        );
        assert!(err.report().is_none());
    }
}
