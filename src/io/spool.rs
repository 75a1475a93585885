//! Spooling of chunked archive bytes into a seekable store.
//!
//! A ZIP catalog lives at the end of the archive and entries are read out of
//! order, so streamed input is collected first. Disk mode keeps memory flat at
//! the cost of a temporary file; memory mode skips the filesystem but holds
//! the whole archive.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::pin;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{Stream, StreamExt};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::{LocalFileReader, MemoryReader, ReadAt};
use crate::error::{Error, Result};

/// Where spooled bytes are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpoolMode {
    /// A temporary file in `dir`, or the system temp directory.
    Disk { dir: Option<PathBuf> },
    Memory,
}

impl Default for SpoolMode {
    fn default() -> Self {
        SpoolMode::Disk { dir: None }
    }
}

/// A fully spooled archive. Dropping it removes the temporary file.
pub struct SpoolHandle {
    inner: Spooled,
}

enum Spooled {
    Disk {
        reader: LocalFileReader,
        // Deletes the file on drop.
        file: NamedTempFile,
    },
    Memory(MemoryReader),
}

impl SpoolHandle {
    /// Path of the spool file, if spooled to disk.
    pub fn path(&self) -> Option<&Path> {
        match &self.inner {
            Spooled::Disk { file, .. } => Some(file.path()),
            Spooled::Memory(_) => None,
        }
    }
}

#[async_trait]
impl ReadAt for SpoolHandle {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        match &self.inner {
            Spooled::Disk { reader, .. } => reader.read_at(offset, buf).await,
            Spooled::Memory(reader) => reader.read_at(offset, buf).await,
        }
    }

    fn size(&self) -> u64 {
        match &self.inner {
            Spooled::Disk { reader, .. } => reader.size(),
            Spooled::Memory(reader) => reader.size(),
        }
    }
}

/// Drain `chunks` into a seekable store.
///
/// The stream is consumed exactly once. A failing chunk aborts spooling and
/// any partial spool file is removed before the error is returned.
pub async fn spool<S, B>(chunks: S, mode: &SpoolMode) -> Result<SpoolHandle>
where
    S: Stream<Item = io::Result<B>>,
    B: AsRef<[u8]>,
{
    let mut chunks = pin!(chunks);

    match mode {
        SpoolMode::Memory => {
            let mut buf = BytesMut::new();
            while let Some(chunk) = chunks.next().await {
                buf.extend_from_slice(chunk?.as_ref());
            }
            tracing::debug!(bytes = buf.len(), "spooled archive into memory");
            Ok(SpoolHandle {
                inner: Spooled::Memory(MemoryReader::new(buf.freeze())),
            })
        }
        SpoolMode::Disk { dir } => {
            let parent = dir.clone().unwrap_or_else(std::env::temp_dir);
            tokio::fs::create_dir_all(&parent)
                .await
                .map_err(Error::io_at(&parent))?;

            let file = tempfile::Builder::new()
                .prefix("async-unzip-")
                .suffix(".zip")
                .tempfile_in(&parent)
                .map_err(Error::io_at(&parent))?;

            let mut out = tokio::fs::File::from_std(file.reopen()?);
            let mut written = 0u64;
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                let chunk = chunk.as_ref();
                if chunk.is_empty() {
                    continue;
                }
                out.write_all(chunk).await.map_err(Error::io_at(file.path()))?;
                written += chunk.len() as u64;
            }
            out.flush().await.map_err(Error::io_at(file.path()))?;
            drop(out);

            tracing::debug!(path = %file.path().display(), bytes = written, "spooled archive to disk");
            let reader = LocalFileReader::from_file(file.reopen()?)?;
            Ok(SpoolHandle {
                inner: Spooled::Disk { reader, file },
            })
        }
    }
}
