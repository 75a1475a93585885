use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

/// Compression method field of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            _ => CompressionMethod::Unsupported(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Unsupported(v) => *v,
        }
    }
}

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General purpose flag: sizes and CRC follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Header ID of the ZIP64 extended information extra field.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;
/// Marker for a 32-bit field whose value lives in the ZIP64 extra field.
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::malformed("invalid end of central directory record"));
        }

        // Skip disk number fields; multi-disk archives are not supported.
        let mut cursor = Cursor::new(&data[8..]);

        Ok(Self {
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == ZIP64_MARKER_32
            || self.cd_offset == ZIP64_MARKER_32
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EocdLocator {
    pub eocd64_offset: u64,
}

impl Zip64EocdLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::malformed("invalid ZIP64 end of central directory locator"));
        }

        let mut cursor = Cursor::new(&data[8..]);
        Ok(Self {
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64Eocd {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64Eocd {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::malformed("invalid ZIP64 end of central directory record"));
        }

        // signature, record size, versions, disk numbers, entries on this disk
        let mut cursor = Cursor::new(&data[32..]);
        Ok(Self {
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Optional signature in front of a data descriptor.
pub const DATA_DESCRIPTOR_SIGNATURE: &[u8] = b"PK\x07\x08";

/// Fixed part of a local file header.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LFH_SIZE || &data[0..4] != LFH_SIGNATURE {
            return Err(Error::malformed("missing local file header signature"));
        }

        // Skip signature and version needed.
        let mut cursor = Cursor::new(&data[6..]);
        Ok(Self {
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: cursor.read_u16::<LittleEndian>()?,
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Length of the header including name and extra field.
    pub fn total_len(&self) -> u64 {
        LFH_SIZE as u64 + self.file_name_length as u64 + self.extra_field_length as u64
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }
}

/// Sizes carried by a ZIP64 extra field, present only for saturated fields.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Zip64Extra {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
}

impl Zip64Extra {
    /// Scan an extra-field block for the ZIP64 record.
    ///
    /// `want_*` say which 32-bit fields were saturated; the record stores
    /// exactly those, in this fixed order. Returns `None` when no ZIP64
    /// record exists.
    pub fn parse(extra: &[u8], want_uncompressed: bool, want_compressed: bool, want_offset: bool) -> Result<Option<Self>> {
        let mut cursor = Cursor::new(extra);
        while (cursor.position() as usize) + 4 <= extra.len() {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()? as u64;
            let field_end = cursor.position() + field_size;
            if field_end as usize > extra.len() {
                return Err(Error::malformed("extra field runs past its block"));
            }

            if header_id == ZIP64_EXTRA_ID {
                let mut zip64 = Zip64Extra::default();
                let take = |wanted: bool, cursor: &mut Cursor<&[u8]>| -> Result<Option<u64>> {
                    if wanted && cursor.position() + 8 <= field_end {
                        Ok(Some(cursor.read_u64::<LittleEndian>()?))
                    } else {
                        Ok(None)
                    }
                };
                zip64.uncompressed_size = take(want_uncompressed, &mut cursor)?;
                zip64.compressed_size = take(want_compressed, &mut cursor)?;
                zip64.header_offset = take(want_offset, &mut cursor)?;
                return Ok(Some(zip64));
            }

            cursor.set_position(field_end);
        }
        Ok(None)
    }
}

/// Sizes and CRC trailing a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Bytes the descriptor occupies, signature included.
    pub len: u64,
}

impl DataDescriptor {
    /// Largest descriptor: signature, CRC and two 8-byte sizes.
    pub const MAX_SIZE: usize = 24;

    /// Parse a descriptor; `zip64` selects 8-byte size fields.
    pub fn from_bytes(data: &[u8], zip64: bool) -> Result<Self> {
        let has_signature = data.len() >= 4 && &data[0..4] == DATA_DESCRIPTOR_SIGNATURE;
        let start = if has_signature { 4 } else { 0 };
        let size_len = if zip64 { 8 } else { 4 };
        let len = start + 4 + 2 * size_len;
        if data.len() < len {
            return Err(Error::malformed("truncated data descriptor"));
        }

        let mut cursor = Cursor::new(&data[start..len]);
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let (compressed_size, uncompressed_size) = if zip64 {
            (cursor.read_u64::<LittleEndian>()?, cursor.read_u64::<LittleEndian>()?)
        } else {
            (
                cursor.read_u32::<LittleEndian>()? as u64,
                cursor.read_u32::<LittleEndian>()? as u64,
            )
        };

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
            len: len as u64,
        })
    }
}

/// One catalog entry, fully delimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative, forward-slash separated.
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: CompressionMethod,
    /// Offset of the first payload byte.
    pub data_offset: u64,
    /// Offset of the local file header.
    pub header_offset: u64,
    pub has_data_descriptor: bool,
    pub encrypted: bool,
    pub crc32: u32,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
}

impl ArchiveEntry {
    /// Directory entries end with '/'
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}
