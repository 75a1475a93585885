//! In-memory ZIP writer for tests.
#![allow(dead_code)]

use std::io::Write;

use flate2::Compression;
use flate2::write::{DeflateEncoder, ZlibEncoder};

pub const STORED: u16 = 0;
pub const DEFLATED: u16 = 8;

const FLAG_ENCRYPTED: u16 = 1;
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// 2025-01-01
const DOS_DATE: u16 = (45 << 9) | (1 << 5) | 1;
/// 12:30:00
const DOS_TIME: u16 = (12 << 11) | (30 << 5);

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Compressible bytes that still differ along their length.
pub fn text(len: usize, seed: u32) -> Vec<u8> {
    let line = format!("line {seed}: the quick brown fox jumps over the lazy dog\n");
    line.bytes()
        .cycle()
        .enumerate()
        .map(|(i, b)| if i % 97 == 0 { b'0' + (i % 10) as u8 } else { b })
        .take(len)
        .collect()
}

/// One record as it will be written.
struct Record {
    name: String,
    method: u16,
    flags: u16,
    payload: Vec<u8>,
    crc: u32,
    uncompressed: u32,
    /// Sizes written into the local header.
    local_sizes: (u32, u32),
    /// Sizes written into the data descriptor, when one follows.
    descriptor: Option<(u32, u32)>,
}

#[derive(Default)]
pub struct ZipBuilder {
    out: Vec<u8>,
    central: Vec<u8>,
    entries: u16,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.plain(name, STORED, data.to_vec(), data)
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.plain(name, DEFLATED, deflate(data), data)
    }

    pub fn dir(self, name: &str) -> Self {
        assert!(name.ends_with('/'));
        self.stored(name, b"")
    }

    /// Method-8 entry whose payload carries a zlib header and trailer.
    pub fn zlib_wrapped(self, name: &str, data: &[u8]) -> Self {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        self.plain(name, DEFLATED, enc.finish().unwrap(), data)
    }

    /// Deflated entry whose stream starts with an invalid block type.
    pub fn corrupt(self, name: &str, data: &[u8]) -> Self {
        let mut payload = deflate(data);
        payload[0] = 0xFF;
        self.plain(name, DEFLATED, payload, data)
    }

    /// Entry compressed with `method`, payload stored as given.
    pub fn with_method(self, name: &str, method: u16, payload: &[u8]) -> Self {
        self.plain(name, method, payload.to_vec(), payload)
    }

    pub fn encrypted(mut self, name: &str, data: &[u8]) -> Self {
        let len = data.len() as u32;
        self.push(Record {
            name: name.into(),
            method: STORED,
            flags: FLAG_ENCRYPTED,
            payload: data.to_vec(),
            crc: crc32fast::hash(data),
            uncompressed: len,
            local_sizes: (len, len),
            descriptor: None,
        });
        self
    }

    /// Deflated entry written the way streaming writers do it: zero sizes in
    /// the local header, real ones in a signed data descriptor.
    pub fn streamed(mut self, name: &str, data: &[u8]) -> Self {
        let payload = deflate(data);
        let sizes = (payload.len() as u32, data.len() as u32);
        self.push(Record {
            name: name.into(),
            method: DEFLATED,
            flags: FLAG_DATA_DESCRIPTOR,
            crc: crc32fast::hash(data),
            uncompressed: data.len() as u32,
            local_sizes: (0, 0),
            descriptor: Some(sizes),
            payload,
        });
        self
    }

    /// Data-descriptor entry whose local header announces `declared_uncompressed`
    /// while the descriptor carries the real size.
    pub fn disagreeing_descriptor(mut self, name: &str, data: &[u8], declared_uncompressed: u32) -> Self {
        let payload = deflate(data);
        let compressed = payload.len() as u32;
        self.push(Record {
            name: name.into(),
            method: DEFLATED,
            flags: FLAG_DATA_DESCRIPTOR,
            crc: crc32fast::hash(data),
            uncompressed: data.len() as u32,
            local_sizes: (compressed, declared_uncompressed),
            descriptor: Some((compressed, data.len() as u32)),
            payload,
        });
        self
    }

    /// Stored entry whose headers claim `declared` uncompressed bytes.
    pub fn misdeclared(mut self, name: &str, data: &[u8], declared: u32) -> Self {
        self.push(Record {
            name: name.into(),
            method: STORED,
            flags: 0,
            payload: data.to_vec(),
            crc: crc32fast::hash(data),
            uncompressed: declared,
            local_sizes: (data.len() as u32, declared),
            descriptor: None,
        });
        self
    }

    fn plain(mut self, name: &str, method: u16, payload: Vec<u8>, original: &[u8]) -> Self {
        let sizes = (payload.len() as u32, original.len() as u32);
        self.push(Record {
            name: name.into(),
            method,
            flags: 0,
            crc: crc32fast::hash(original),
            uncompressed: original.len() as u32,
            local_sizes: sizes,
            descriptor: None,
            payload,
        });
        self
    }

    fn push(&mut self, record: Record) {
        let offset = self.out.len() as u32;
        let name = record.name.as_bytes();
        let (local_crc, cd_sizes) = match record.descriptor {
            Some(sizes) => (0, sizes),
            None => (record.crc, (record.payload.len() as u32, record.uncompressed)),
        };

        let out = &mut self.out;
        out.extend_from_slice(b"PK\x03\x04");
        put16(out, 20);
        put16(out, record.flags);
        put16(out, record.method);
        put16(out, DOS_TIME);
        put16(out, DOS_DATE);
        put32(out, local_crc);
        put32(out, record.local_sizes.0);
        put32(out, record.local_sizes.1);
        put16(out, name.len() as u16);
        put16(out, 0);
        out.extend_from_slice(name);
        out.extend_from_slice(&record.payload);
        if let Some((compressed, uncompressed)) = record.descriptor {
            out.extend_from_slice(b"PK\x07\x08");
            put32(out, record.crc);
            put32(out, compressed);
            put32(out, uncompressed);
        }

        let cd = &mut self.central;
        cd.extend_from_slice(b"PK\x01\x02");
        put16(cd, 20);
        put16(cd, 20);
        put16(cd, record.flags);
        put16(cd, record.method);
        put16(cd, DOS_TIME);
        put16(cd, DOS_DATE);
        put32(cd, record.crc);
        put32(cd, cd_sizes.0);
        put32(cd, cd_sizes.1);
        put16(cd, name.len() as u16);
        put16(cd, 0);
        put16(cd, 0);
        put16(cd, 0);
        put16(cd, 0);
        put32(cd, 0);
        put32(cd, offset);
        cd.extend_from_slice(name);

        self.entries += 1;
    }

    pub fn finish(self) -> Vec<u8> {
        self.finish_with_comment(b"")
    }

    pub fn finish_with_comment(mut self, comment: &[u8]) -> Vec<u8> {
        let cd_offset = self.out.len() as u32;
        let cd_size = self.central.len() as u32;
        self.out.extend_from_slice(&self.central);

        let out = &mut self.out;
        out.extend_from_slice(b"PK\x05\x06");
        put16(out, 0);
        put16(out, 0);
        put16(out, self.entries);
        put16(out, self.entries);
        put32(out, cd_size);
        put32(out, cd_offset);
        put16(out, comment.len() as u16);
        out.extend_from_slice(comment);
        self.out
    }

    /// Local records only, as left behind by an interrupted writer.
    pub fn finish_without_central_directory(self) -> Vec<u8> {
        self.out
    }
}

fn put16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
