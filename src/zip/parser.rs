//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategies
//!
//! Central directory first:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. Read each entry's Local File Header to locate its payload
//!
//! Local headers in physical order:
//! 1. Walk `PK\x03\x04` records from the start of the archive
//! 2. Skip each payload by its declared size, or, when sizes were deferred
//!    to a data descriptor, by inflating to the end of the deflate stream
//! 3. Stop at the first central directory record
//!
//! The second strategy never looks at the archive's tail, so it also works
//! for archives whose trailer is missing or damaged.

use byteorder::{ByteOrder, LittleEndian};
use std::sync::Arc;

use crate::backend::{BASELINE, Framing, Registry};
use crate::error::{Error, Result};
use crate::io::{ReadAt, read_exact_at};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Fixed part of a central directory file header.
const CDFH_FIXED_SIZE: usize = 46;

/// Read size used while skipping over deflate payloads.
const SCAN_CHUNK: usize = 64 * 1024;

/// How the catalog is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Central directory when present, local headers otherwise.
    #[default]
    Auto,
    CentralDirectory,
    LocalHeaders,
}

/// Reads the entry catalog of an archive.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let entries = parser.read_catalog(ReadStrategy::Auto).await?;
/// for entry in entries {
///     println!("{} at {}", entry.name, entry.data_offset);
/// }
/// ```
pub struct ZipParser<R: ReadAt + ?Sized> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt + ?Sized> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Read every entry in catalog order.
    pub async fn read_catalog(&self, strategy: ReadStrategy) -> Result<Vec<ArchiveEntry>> {
        let entries = match strategy {
            ReadStrategy::CentralDirectory => {
                let eocd = self.find_eocd().await?;
                self.read_central_directory(eocd).await?
            }
            ReadStrategy::LocalHeaders => self.scan_local_headers().await?,
            ReadStrategy::Auto => match self.find_eocd().await {
                Ok(eocd) => self.read_central_directory(eocd).await?,
                Err(Error::MalformedArchive(reason)) => {
                    tracing::debug!(%reason, "no central directory, scanning local headers");
                    self.scan_local_headers().await?
                }
                Err(err) => return Err(err),
            },
        };

        warn_on_unordered_offsets(&entries);
        Ok(entries)
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Handles archives with a trailing comment by searching backwards for
    /// the signature. Returns the record and its offset.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            return Err(Error::malformed("archive is too small to hold a central directory"));
        }

        // Common case first: no comment, so the record ends the file.
        let offset = self.size - eocd_size;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        read_exact_at(&*self.reader, offset, &mut buf).await?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
        }

        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;
        let mut buf = vec![0u8; search_size as usize];
        read_exact_at(&*self.reader, search_start, &mut buf).await?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length must account for every remaining byte.
                let comment_len = LittleEndian::read_u16(&buf[i + 20..i + 22]) as usize;
                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(Error::malformed("end of central directory record not found"))
    }

    /// Locate the ZIP64 record through the locator in front of the EOCD.
    async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64Eocd> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EocdLocator::SIZE as u64)
            .ok_or_else(|| Error::malformed("ZIP64 locator missing"))?;
        let mut locator_buf = vec![0u8; Zip64EocdLocator::SIZE];
        read_exact_at(&*self.reader, locator_offset, &mut locator_buf).await?;
        let locator = Zip64EocdLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64Eocd::MIN_SIZE];
        read_exact_at(&*self.reader, locator.eocd64_offset, &mut eocd64_buf).await?;
        Zip64Eocd::from_bytes(&eocd64_buf)
    }

    async fn read_central_directory(
        &self,
        (eocd, eocd_offset): (EndOfCentralDirectory, u64),
    ) -> Result<Vec<ArchiveEntry>> {
        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (eocd.cd_offset as u64, eocd.cd_size as u64, eocd.total_entries as u64)
        };

        if cd_offset.checked_add(cd_size).is_none_or(|end| end > self.size) {
            return Err(Error::malformed("central directory lies outside the archive"));
        }

        // One read for the whole directory.
        let mut cd_data = vec![0u8; cd_size as usize];
        read_exact_at(&*self.reader, cd_offset, &mut cd_data).await?;

        // Every record is at least 46 bytes, which bounds a lying entry count.
        let capacity = total_entries.min(cd_size / CDFH_FIXED_SIZE as u64) as usize;
        let mut entries = Vec::with_capacity(capacity);
        let mut pos = 0usize;
        for _ in 0..total_entries {
            let (mut entry, next) = parse_cdfh(&cd_data, pos)?;
            pos = next;

            let mut lfh_buf = [0u8; LFH_SIZE];
            read_exact_at(&*self.reader, entry.header_offset, &mut lfh_buf).await?;
            let lfh = LocalFileHeader::from_bytes(&lfh_buf).map_err(|_| {
                Error::malformed(format!(
                    "local file header of '{}' missing at offset {}",
                    entry.name, entry.header_offset
                ))
            })?;
            entry.data_offset = entry.header_offset + lfh.total_len();
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Walk local file headers in physical order.
    async fn scan_local_headers(&self) -> Result<Vec<ArchiveEntry>> {
        if self.size < 4 {
            return Err(Error::malformed("archive is too small to hold a local file header"));
        }

        let mut entries = Vec::new();
        let mut offset = 0u64;

        while offset + 4 <= self.size {
            let mut sig = [0u8; 4];
            read_exact_at(&*self.reader, offset, &mut sig).await?;
            if sig == LFH_SIGNATURE {
                let (entry, next) = self.read_local_entry(offset).await?;
                entries.push(entry);
                offset = next;
            } else if sig == CDFH_SIGNATURE
                || sig == EndOfCentralDirectory::SIGNATURE
                || sig == Zip64Eocd::SIGNATURE
            {
                break;
            } else {
                return Err(Error::malformed(format!("expected a local file header at offset {offset}")));
            }
        }

        Ok(entries)
    }

    /// Parse the entry whose local header starts at `offset`.
    ///
    /// Returns the entry and the offset just past its payload and descriptor.
    async fn read_local_entry(&self, offset: u64) -> Result<(ArchiveEntry, u64)> {
        let mut fixed = [0u8; LFH_SIZE];
        read_exact_at(&*self.reader, offset, &mut fixed).await?;
        let lfh = LocalFileHeader::from_bytes(&fixed)?;

        let name_len = lfh.file_name_length as usize;
        let mut var = vec![0u8; name_len + lfh.extra_field_length as usize];
        read_exact_at(&*self.reader, offset + LFH_SIZE as u64, &mut var).await?;
        let name = String::from_utf8_lossy(&var[..name_len]).into_owned();

        let zip64 = Zip64Extra::parse(
            &var[name_len..],
            lfh.uncompressed_size == ZIP64_MARKER_32,
            lfh.compressed_size == ZIP64_MARKER_32,
            false,
        )?;
        let declared_compressed = zip64
            .and_then(|z| z.compressed_size)
            .unwrap_or(lfh.compressed_size as u64);
        let declared_uncompressed = zip64
            .and_then(|z| z.uncompressed_size)
            .unwrap_or(lfh.uncompressed_size as u64);

        let method = CompressionMethod::from_u16(lfh.compression_method);
        let data_offset = offset + lfh.total_len();

        let mut entry = ArchiveEntry {
            name,
            compressed_size: declared_compressed,
            uncompressed_size: declared_uncompressed,
            compression_method: method,
            data_offset,
            header_offset: offset,
            has_data_descriptor: lfh.has_data_descriptor(),
            encrypted: lfh.flags & FLAG_ENCRYPTED != 0,
            crc32: lfh.crc32,
            last_mod_time: lfh.last_mod_time,
            last_mod_date: lfh.last_mod_date,
        };

        if !entry.has_data_descriptor {
            return Ok((entry, data_offset + declared_compressed));
        }

        // Declared sizes are provisional until the descriptor is read.
        let payload_len = if declared_compressed > 0 {
            declared_compressed
        } else {
            self.measure_payload(&entry).await?
        };

        let descriptor_offset = data_offset + payload_len;
        let available = (self.size.saturating_sub(descriptor_offset) as usize).min(DataDescriptor::MAX_SIZE);
        let mut buf = [0u8; DataDescriptor::MAX_SIZE];
        read_exact_at(&*self.reader, descriptor_offset, &mut buf[..available]).await?;
        let descriptor = DataDescriptor::from_bytes(&buf[..available], zip64.is_some())?;

        for (declared, actual) in [
            (declared_compressed, descriptor.compressed_size),
            (declared_uncompressed, descriptor.uncompressed_size),
        ] {
            // Zero is how writers say "unknown"; anything else must agree.
            if declared != 0 && declared != actual {
                return Err(Error::SizeMismatch {
                    entry: entry.name,
                    expected: declared,
                    actual,
                });
            }
        }
        if descriptor.compressed_size != payload_len {
            return Err(Error::SizeMismatch {
                entry: entry.name,
                expected: descriptor.compressed_size,
                actual: payload_len,
            });
        }

        entry.compressed_size = descriptor.compressed_size;
        entry.uncompressed_size = descriptor.uncompressed_size;
        entry.crc32 = descriptor.crc32;
        Ok((entry, descriptor_offset + descriptor.len))
    }

    /// Length of a payload whose size was deferred to its data descriptor.
    async fn measure_payload(&self, entry: &ArchiveEntry) -> Result<u64> {
        match entry.compression_method {
            CompressionMethod::Deflated if !entry.encrypted => self.measure_deflate(entry).await,
            _ => {
                let mut sig = [0u8; 4];
                let n = self.reader.read_at(entry.data_offset, &mut sig).await?;
                if entry.is_dir() || (n == 4 && sig == DATA_DESCRIPTOR_SIGNATURE) {
                    Ok(0)
                } else {
                    Err(Error::UnsupportedFeature(format!(
                        "cannot delimit '{}': method {} with sizes deferred to a data descriptor",
                        entry.name,
                        entry.compression_method.as_u16()
                    )))
                }
            }
        }
    }

    /// Inflate to the end of the deflate stream, counting input consumed.
    async fn measure_deflate(&self, entry: &ArchiveEntry) -> Result<u64> {
        let backend = Registry::global().resolve(Some(BASELINE))?;
        let mut inflater = backend.inflater(Framing::Raw);
        let mut input = vec![0u8; SCAN_CHUNK];
        let mut scratch = vec![0u8; SCAN_CHUNK];
        let mut consumed = 0u64;

        loop {
            let n = self.reader.read_at(entry.data_offset + consumed, &mut input).await?;
            if n == 0 {
                return Err(Error::malformed(format!("deflate stream of '{}' is truncated", entry.name)));
            }

            let mut pos = 0;
            loop {
                let status = inflater
                    .inflate(&input[pos..n], &mut scratch)
                    .map_err(|e| Error::Decompression {
                        entry: entry.name.clone(),
                        reason: e.0,
                    })?;
                pos += status.consumed;
                if status.finished {
                    return Ok(consumed + pos as u64);
                }
                if !status.made_progress() {
                    break;
                }
            }
            consumed += pos as u64;
        }
    }
}

/// Parse the central directory record at `pos`; returns it and the next position.
///
/// `data_offset` is left at zero for the caller to fill from the local header.
fn parse_cdfh(cd: &[u8], pos: usize) -> Result<(ArchiveEntry, usize)> {
    let truncated = || Error::malformed("truncated central directory");
    let fixed = cd.get(pos..pos + CDFH_FIXED_SIZE).ok_or_else(truncated)?;
    if &fixed[0..4] != CDFH_SIGNATURE {
        return Err(Error::malformed(format!("invalid central directory record at {pos}")));
    }

    let u16_at = |at: usize| LittleEndian::read_u16(&fixed[at..at + 2]);
    let u32_at = |at: usize| LittleEndian::read_u32(&fixed[at..at + 4]);

    let flags = u16_at(8);
    let compression_method = u16_at(10);
    let last_mod_time = u16_at(12);
    let last_mod_date = u16_at(14);
    let crc32 = u32_at(16);
    let compressed_size = u32_at(20);
    let uncompressed_size = u32_at(24);
    let name_len = u16_at(28) as usize;
    let extra_len = u16_at(30) as usize;
    let comment_len = u16_at(32) as usize;
    let lfh_offset = u32_at(42);

    let name_start = pos + CDFH_FIXED_SIZE;
    let extra_start = name_start + name_len;
    let end = extra_start + extra_len + comment_len;
    if end > cd.len() {
        return Err(truncated());
    }

    // Use lossy conversion to handle non-UTF8 filenames gracefully
    let name = String::from_utf8_lossy(&cd[name_start..extra_start]).into_owned();
    let zip64 = Zip64Extra::parse(
        &cd[extra_start..extra_start + extra_len],
        uncompressed_size == ZIP64_MARKER_32,
        compressed_size == ZIP64_MARKER_32,
        lfh_offset == ZIP64_MARKER_32,
    )?
    .unwrap_or_default();

    let entry = ArchiveEntry {
        name,
        compressed_size: zip64.compressed_size.unwrap_or(compressed_size as u64),
        uncompressed_size: zip64.uncompressed_size.unwrap_or(uncompressed_size as u64),
        compression_method: CompressionMethod::from_u16(compression_method),
        data_offset: 0,
        header_offset: zip64.header_offset.unwrap_or(lfh_offset as u64),
        has_data_descriptor: flags & FLAG_DATA_DESCRIPTOR != 0,
        encrypted: flags & FLAG_ENCRYPTED != 0,
        crc32,
        last_mod_time,
        last_mod_date,
    };
    Ok((entry, end))
}

fn warn_on_unordered_offsets(entries: &[ArchiveEntry]) {
    if let Some(pair) = entries.windows(2).find(|w| w[1].data_offset < w[0].data_offset) {
        tracing::warn!(
            first = %pair[0].name,
            second = %pair[1].name,
            "catalog order does not follow payload order"
        );
    }
}
