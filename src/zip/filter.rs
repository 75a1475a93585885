//! Entry selection.

use std::collections::HashSet;
use std::path::PathBuf;

use regex::Regex;

use super::structures::{ArchiveEntry, CompressionMethod};
use crate::error::{Error, Result};

/// Whitelist and pattern filters over full archive-relative names.
///
/// With no filters every entry is selected. Otherwise an entry is selected
/// when it is whitelisted or matches any pattern.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    files: HashSet<String>,
    patterns: Vec<Regex>,
}

impl EntryFilter {
    pub fn new<F, P>(files: F, regex_files: P) -> Result<Self>
    where
        F: IntoIterator,
        F::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let patterns = regex_files
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            files: files.into_iter().map(Into::into).collect(),
            patterns,
        })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.files.is_empty() && self.patterns.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.is_unrestricted()
            || self.files.contains(name)
            || self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Keep matching entries in catalog order.
    pub fn select(&self, catalog: Vec<ArchiveEntry>, destination: impl Into<PathBuf>) -> ExtractionPlan {
        ExtractionPlan {
            entries: catalog.into_iter().filter(|e| self.matches(&e.name)).collect(),
            destination: destination.into(),
        }
    }
}

/// Entries chosen for one run and where they go.
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub entries: Vec<ArchiveEntry>,
    pub destination: PathBuf,
}

impl ExtractionPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail before any work starts if a selected entry cannot be decoded.
    pub fn ensure_supported(&self) -> Result<()> {
        for entry in &self.entries {
            if entry.encrypted {
                return Err(Error::UnsupportedFeature(format!("'{}' is encrypted", entry.name)));
            }
            if let CompressionMethod::Unsupported(method) = entry.compression_method {
                return Err(Error::UnsupportedFeature(format!(
                    "'{}' uses compression method {method}",
                    entry.name
                )));
            }
        }
        Ok(())
    }
}
