use tokio_util::sync::CancellationToken;

use crate::zip::ReadStrategy;

/// Default number of concurrent extractions.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Chunk size for mid-sized entries and for an explicit zero.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const SMALL_BUFFER_SIZE: usize = 32 * 1024;
const LARGE_BUFFER_SIZE: usize = 256 * 1024;
const SMALL_ENTRY: u64 = 1_000_000;
const LARGE_ENTRY: u64 = 100_000_000;

/// Knobs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Exact archive-relative names to extract.
    pub files: Vec<String>,
    /// Patterns matched against archive-relative names.
    pub regex_files: Vec<String>,
    /// Fixed chunk size; adaptive per entry when `None`.
    pub buffer_size: Option<usize>,
    pub max_workers: usize,
    /// Engine name; the registry default when `None`.
    pub backend: Option<String>,
    /// Emit per-entry progress events.
    pub debug: bool,
    /// Stop dispatching queued entries after the first failure.
    pub fail_fast: bool,
    /// Write to a sibling temporary path and rename on success.
    pub atomic_writes: bool,
    pub strategy: ReadStrategy,
    pub cancel: Option<CancellationToken>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            regex_files: Vec::new(),
            buffer_size: None,
            max_workers: DEFAULT_MAX_WORKERS,
            backend: None,
            debug: false,
            fail_fast: false,
            atomic_writes: false,
            strategy: ReadStrategy::Auto,
            cancel: None,
        }
    }
}

impl ExtractOptions {
    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn regex_files<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regex_files = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Values below one are raised to one.
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn atomic_writes(mut self, atomic: bool) -> Self {
        self.atomic_writes = atomic;
        self
    }

    pub fn strategy(mut self, strategy: ReadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Effective worker count.
    pub fn workers(&self) -> usize {
        self.max_workers.max(1)
    }

    /// Chunk size for an entry of `uncompressed_size` bytes.
    pub fn chunk_size_for(&self, uncompressed_size: u64) -> usize {
        match self.buffer_size {
            Some(0) => DEFAULT_BUFFER_SIZE,
            Some(size) => size,
            None if uncompressed_size < SMALL_ENTRY => SMALL_BUFFER_SIZE,
            None if uncompressed_size > LARGE_ENTRY => LARGE_BUFFER_SIZE,
            None => DEFAULT_BUFFER_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_chunk_sizes() {
        let options = ExtractOptions::default();
        assert_eq!(options.chunk_size_for(10), 32 * 1024);
        assert_eq!(options.chunk_size_for(5_000_000), 64 * 1024);
        assert_eq!(options.chunk_size_for(500_000_000), 256 * 1024);
    }

    #[test]
    fn explicit_chunk_size_wins() {
        assert_eq!(ExtractOptions::default().buffer_size(256).chunk_size_for(1 << 40), 256);
        assert_eq!(ExtractOptions::default().buffer_size(0).chunk_size_for(1), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn workers_never_drop_below_one() {
        assert_eq!(ExtractOptions::default().max_workers(0).workers(), 1);
        let mut options = ExtractOptions::default();
        options.max_workers = 0;
        assert_eq!(options.workers(), 1);
    }
}
