//! Byte sources the extraction engine reads archives from.
//!
//! Every source answers positional reads, so workers never share a cursor:
//! each one asks for the bytes at its own offset.

pub mod http;
mod local;
mod memory;
mod spool;

pub use local::LocalFileReader;
pub use memory::MemoryReader;
pub use spool::{SpoolHandle, SpoolMode, spool};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// Returns fewer bytes than requested only at the end of the source.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

#[async_trait]
impl<R: ReadAt + ?Sized> ReadAt for Arc<R> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf).await
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

/// Fill `buf` completely from `offset`, treating a short read as truncation.
pub async fn read_exact_at<R: ReadAt + ?Sized>(reader: &R, offset: u64, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read_at(offset + filled as u64, &mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::malformed(format!(
                "unexpected end of archive at offset {}",
                offset + filled as u64
            )));
        }
        filled += n;
    }
    Ok(())
}
