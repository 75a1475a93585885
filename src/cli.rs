use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::io::SpoolMode;
use crate::io::http;
use crate::options::{DEFAULT_MAX_WORKERS, ExtractOptions};
use crate::zip::ReadStrategy;

#[derive(Parser, Debug)]
#[command(name = "async-unzip")]
#[command(version)]
#[command(about = "Extract ZIP archives with bounded concurrency", long_about = None)]
#[command(after_help = "Examples:\n  \
  async-unzip data.zip -d out              extract everything into out/\n  \
  async-unzip data.zip a.txt --regex '\\.md$'   extract a.txt and every .md entry\n  \
  curl -s https://example.com/a.zip | async-unzip - -d out\n  \
  async-unzip -l https://example.com/a.zip   list a remote archive")]
pub struct Cli {
    /// ZIP file path, HTTP URL, or '-' for standard input
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Exact entry names to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Also extract entries whose name matches this pattern
    #[arg(long = "regex", value_name = "PATTERN")]
    pub regex_files: Vec<String>,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR", default_value = ".")]
    pub extract_dir: PathBuf,

    /// Maximum number of entries extracted at once
    #[arg(short = 'j', long = "workers", default_value_t = DEFAULT_MAX_WORKERS)]
    pub workers: usize,

    /// Chunk size in bytes (default: adaptive per entry)
    #[arg(long, value_name = "BYTES")]
    pub buffer_size: Option<usize>,

    /// Decompression backend
    #[arg(long, value_name = "NAME")]
    pub backend: Option<String>,

    /// How the entry catalog is read
    #[arg(long, value_enum, default_value_t = Strategy::Auto)]
    pub strategy: Strategy,

    /// Directory for the temporary copy of streamed archives
    #[arg(long, value_name = "DIR", conflicts_with = "in_memory")]
    pub spool_dir: Option<PathBuf>,

    /// Hold streamed archives in memory instead of a temporary file
    #[arg(long)]
    pub in_memory: bool,

    /// Stop starting new entries after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Write each file under a temporary name and rename it when complete
    #[arg(long)]
    pub atomic: bool,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// Print the available decompression backends
    #[arg(long)]
    pub list_backends: bool,

    /// Log per-entry progress
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    Auto,
    Central,
    Local,
}

impl From<Strategy> for ReadStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Auto => ReadStrategy::Auto,
            Strategy::Central => ReadStrategy::CentralDirectory,
            Strategy::Local => ReadStrategy::LocalHeaders,
        }
    }
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        http::is_http_url(&self.source)
    }

    pub fn is_stdin(&self) -> bool {
        self.source == "-"
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn options(&self) -> ExtractOptions {
        let mut options = ExtractOptions::default()
            .files(self.files.iter().cloned())
            .regex_files(self.regex_files.iter().cloned())
            .max_workers(self.workers)
            .debug(self.verbose)
            .fail_fast(self.fail_fast)
            .atomic_writes(self.atomic)
            .strategy(self.strategy.into());
        if let Some(size) = self.buffer_size {
            options = options.buffer_size(size);
        }
        if let Some(name) = &self.backend {
            options = options.backend(name.clone());
        }
        options
    }

    pub fn spool_mode(&self) -> SpoolMode {
        if self.in_memory {
            SpoolMode::Memory
        } else {
            SpoolMode::Disk {
                dir: self.spool_dir.clone(),
            }
        }
    }
}
