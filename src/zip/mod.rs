//! ZIP archive parsing and entry selection.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Catalog reading, from the central directory or local headers
//! - [`filter`]: Whitelist/pattern selection producing an [`ExtractionPlan`]
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file, each optionally
//!    followed by a data descriptor
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - Data descriptors, including archives written by streaming writers
//! - STORED and DEFLATE compression methods
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod filter;
mod parser;
mod structures;

pub use filter::{EntryFilter, ExtractionPlan};
pub use parser::{ReadStrategy, ZipParser};
pub use structures::*;
