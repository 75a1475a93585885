//! # async-unzip
//!
//! Bounded-concurrency ZIP extraction from files, byte sources and
//! chunk streams.
//!
//! The archive catalog is read once, filtered into a plan, and each
//! selected entry is streamed to disk by its own worker. At most
//! `max_workers` workers run at a time, and a failing entry never takes its
//! siblings down with it: the run reports every outcome.
//!
//! ## Features
//!
//! - Central-directory and local-header catalog strategies
//! - ZIP64 archives and data descriptors
//! - STORED and DEFLATE entries, inflated by a pluggable backend
//! - Streamed input spooled to a temporary file or to memory
//! - Exact-name and regex entry selection
//!
//! ## Example
//!
//! ```no_run
//! use async_unzip::{ExtractOptions, unzip};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = ExtractOptions::default()
//!         .max_workers(8)
//!         .regex_files([r"\.txt$"]);
//!
//!     let report = unzip("archive.zip", "out", &options).await?;
//!     println!("{} entries, {} bytes", report.succeeded.len(), report.bytes_written());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cli;
mod error;
pub mod extract;
pub mod io;
pub mod options;
pub mod zip;

pub use backend::Registry;
pub use cli::Cli;
pub use error::{Error, ErrorKind, Result};
pub use extract::{EntryFailure, ExtractedEntry, ExtractionReport, list, unzip, unzip_reader, unzip_stream};
pub use io::{LocalFileReader, MemoryReader, ReadAt, SpoolMode};
pub use options::ExtractOptions;
pub use tokio_util::sync::CancellationToken;
pub use zip::{ArchiveEntry, CompressionMethod, ReadStrategy};
