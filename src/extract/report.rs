use std::path::PathBuf;

use crate::error::{Error, ErrorKind, Result};

/// Outcome of one worker.
#[derive(Debug)]
pub struct WorkerResult {
    pub name: String,
    pub bytes_written: u64,
    /// Final path of the written file or directory.
    pub outcome: Result<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub name: String,
    pub path: PathBuf,
    pub bytes_written: u64,
}

#[derive(Debug)]
pub struct EntryFailure {
    pub name: String,
    /// Bytes already written when the failure happened.
    pub bytes_written: u64,
    pub error: Error,
}

impl EntryFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Aggregate result of a run.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub succeeded: Vec<ExtractedEntry>,
    /// Sorted by entry name.
    pub failed: Vec<EntryFailure>,
    /// Entries never started because dispatch stopped early.
    pub skipped: Vec<String>,
    pub directories_created: usize,
    /// Most extractions observed running at once.
    pub peak_in_flight: usize,
}

impl ExtractionReport {
    pub fn record(&mut self, result: WorkerResult) {
        match result.outcome {
            Ok(path) => self.succeeded.push(ExtractedEntry {
                name: result.name,
                path,
                bytes_written: result.bytes_written,
            }),
            Err(error) => self.failed.push(EntryFailure {
                name: result.name,
                bytes_written: result.bytes_written,
                error,
            }),
        }
    }

    /// Entries in the plan.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    /// Entries that failed or never ran.
    pub fn unfinished(&self) -> usize {
        self.failed.len() + self.skipped.len()
    }

    pub fn is_success(&self) -> bool {
        self.unfinished() == 0
    }

    pub fn bytes_written(&self) -> u64 {
        self.succeeded.iter().map(|e| e.bytes_written).sum()
    }

    pub fn failure(&self, name: &str) -> Option<&EntryFailure> {
        self.failed.iter().find(|f| f.name == name)
    }

    /// Put completion-ordered lists into a stable order.
    pub(crate) fn sort(&mut self) {
        self.succeeded.sort_by(|a, b| a.name.cmp(&b.name));
        self.failed.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// `Ok` on full success, otherwise the report wrapped in an error.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::EntriesFailed(Box::new(self)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(name: &str, bytes: u64) -> WorkerResult {
        WorkerResult {
            name: name.into(),
            bytes_written: bytes,
            outcome: Ok(PathBuf::from(name)),
        }
    }

    fn failed(name: &str) -> WorkerResult {
        WorkerResult {
            name: name.into(),
            bytes_written: 3,
            outcome: Err(Error::Decompression {
                entry: name.into(),
                reason: "invalid block type".into(),
            }),
        }
    }

    #[test]
    fn partial_failure_becomes_an_error() {
        let mut report = ExtractionReport::default();
        report.record(ok("b", 5));
        report.record(failed("z"));
        report.record(failed("c"));
        report.record(ok("a", 2));
        report.sort();

        assert_eq!(report.total(), 4);
        assert_eq!(report.bytes_written(), 7);
        assert_eq!(report.failed[0].name, "c");
        assert_eq!(report.failure("z").unwrap().kind(), ErrorKind::DecompressionError);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntriesFailed);
        assert_eq!(err.to_string(), "2 of 4 entries did not extract");
        assert_eq!(err.report().unwrap().succeeded.len(), 2);
    }

    #[test]
    fn skipped_entries_are_not_success() {
        let mut report = ExtractionReport::default();
        report.record(ok("a", 1));
        report.skipped.push("b".into());
        assert!(!report.is_success());
        assert!(report.into_result().is_err());
    }
}
