//! Streaming extraction of a single entry.
//!
//! A worker holds one input and one output buffer of the chunk size, so its
//! memory use does not depend on the size of the entry.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::path::{DirectoryCache, partial_path, resolve};
use super::report::WorkerResult;
use crate::backend::{BackendHandle, Inflate, InflateError};
use crate::error::{Error, Result};
use crate::io::{ReadAt, read_exact_at};
use crate::options::ExtractOptions;
use crate::zip::{ArchiveEntry, CompressionMethod};

/// Everything an extraction needs besides the entry itself.
pub struct Worker<'a, R: ReadAt + ?Sized> {
    pub reader: &'a R,
    pub backend: &'a BackendHandle,
    pub dirs: &'a DirectoryCache,
    pub destination: &'a Path,
    pub options: &'a ExtractOptions,
}

/// Open output file plus where it ends up.
struct Output {
    file: File,
    write_path: PathBuf,
    written: u64,
}

impl Output {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.file
            .write_all(buf)
            .await
            .map_err(Error::io_at(&self.write_path))?;
        self.written += buf.len() as u64;
        Ok(())
    }
}

impl<'a, R: ReadAt + ?Sized> Worker<'a, R> {
    /// Extract `entry`; failures are captured in the result, never raised.
    pub async fn extract(&self, entry: &ArchiveEntry) -> WorkerResult {
        let mut written = 0;
        let outcome = self.run(entry, &mut written).await;
        if let Err(err) = &outcome {
            tracing::debug!(entry = %entry.name, %err, "entry failed");
        }
        WorkerResult {
            name: entry.name.clone(),
            bytes_written: written,
            outcome,
        }
    }

    async fn run(&self, entry: &ArchiveEntry, written: &mut u64) -> Result<PathBuf> {
        let target = resolve(self.destination, &entry.name)?;
        if self.options.debug {
            tracing::debug!(entry = %entry.name, target = %target.display(), "entry started");
        }

        if entry.is_dir() {
            self.dirs.ensure_dir(&target).await?;
            return Ok(target);
        }
        self.dirs.ensure_parent(&target).await?;

        let write_path = if self.options.atomic_writes {
            partial_path(&target)
        } else {
            target.clone()
        };
        let file = File::create(&write_path)
            .await
            .map_err(Error::io_at(&write_path))?;
        let mut out = Output {
            file,
            write_path,
            written: 0,
        };

        let result = self.write_payload(entry, &mut out).await;
        *written = out.written;
        let result = match result {
            Ok(()) => out.file.flush().await.map_err(Error::io_at(&out.write_path)),
            Err(err) => Err(err),
        };
        drop(out.file);

        if self.options.atomic_writes {
            match result {
                Ok(()) => tokio::fs::rename(&out.write_path, &target)
                    .await
                    .map_err(Error::io_at(&target))?,
                Err(err) => {
                    // best effort, the entry already failed
                    let _ = tokio::fs::remove_file(&out.write_path).await;
                    return Err(err);
                }
            }
        } else {
            result?;
        }

        Ok(target)
    }

    async fn write_payload(&self, entry: &ArchiveEntry, out: &mut Output) -> Result<()> {
        let chunk = self.options.chunk_size_for(entry.uncompressed_size);
        if self.options.debug {
            tracing::debug!(entry = %entry.name, offset = entry.data_offset, chunk, "seek to payload");
        }

        match entry.compression_method {
            CompressionMethod::Stored => self.copy_stored(entry, out, chunk).await?,
            CompressionMethod::Deflated => self.inflate(entry, out, chunk).await?,
            CompressionMethod::Unsupported(method) => {
                return Err(Error::UnsupportedFeature(format!(
                    "'{}' uses compression method {method}",
                    entry.name
                )));
            }
        }

        if out.written != entry.uncompressed_size {
            return Err(Error::SizeMismatch {
                entry: entry.name.clone(),
                expected: entry.uncompressed_size,
                actual: out.written,
            });
        }
        Ok(())
    }

    async fn copy_stored(&self, entry: &ArchiveEntry, out: &mut Output, chunk: usize) -> Result<()> {
        let mut buf = vec![0u8; entry.compressed_size.min(chunk as u64) as usize];
        let mut offset = entry.data_offset;
        let mut remaining = entry.compressed_size;

        while remaining > 0 {
            self.checkpoint(entry)?;
            let len = remaining.min(chunk as u64) as usize;
            read_exact_at(self.reader, offset, &mut buf[..len]).await?;
            out.write(&buf[..len]).await?;
            offset += len as u64;
            remaining -= len as u64;
            self.progress(entry, out.written);
        }
        Ok(())
    }

    async fn inflate(&self, entry: &ArchiveEntry, out: &mut Output, chunk: usize) -> Result<()> {
        if entry.compressed_size == 0 {
            return Ok(());
        }

        let mut input = vec![0u8; entry.compressed_size.min(chunk as u64) as usize];
        let mut output = vec![0u8; chunk];
        let mut offset = entry.data_offset;
        let mut remaining = entry.compressed_size;

        self.checkpoint(entry)?;
        let mut len = self.read_chunk(entry, &mut offset, &mut remaining, &mut input).await?;
        let framing = self
            .backend
            .framing_for(entry.compression_method, &input[..len])
            .map_err(|e| decompression_error(entry, e))?;
        let mut inflater = self.backend.inflater(framing);

        loop {
            if pump(entry, &mut *inflater, &input[..len], &mut output, out).await? {
                return Ok(());
            }
            self.progress(entry, out.written);

            if remaining == 0 {
                break;
            }
            self.checkpoint(entry)?;
            len = self.read_chunk(entry, &mut offset, &mut remaining, &mut input).await?;
        }

        // Input is exhausted; anything still buffered comes out now.
        if pump(entry, &mut *inflater, &[], &mut output, out).await? {
            return Ok(());
        }
        Err(Error::Decompression {
            entry: entry.name.clone(),
            reason: "compressed data ended before the final deflate block".into(),
        })
    }

    async fn read_chunk(
        &self,
        entry: &ArchiveEntry,
        offset: &mut u64,
        remaining: &mut u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let len = (*remaining).min(buf.len() as u64) as usize;
        read_exact_at(self.reader, *offset, &mut buf[..len])
            .await
            .map_err(|err| match err {
                Error::MalformedArchive(_) => Error::malformed(format!("payload of '{}' is truncated", entry.name)),
                other => other,
            })?;
        *offset += len as u64;
        *remaining -= len as u64;
        Ok(len)
    }

    fn checkpoint(&self, entry: &ArchiveEntry) -> Result<()> {
        match &self.options.cancel {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled {
                entry: entry.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn progress(&self, entry: &ArchiveEntry, written: u64) {
        if self.options.debug {
            tracing::debug!(entry = %entry.name, bytes = written, total = entry.uncompressed_size, "decompressed");
        }
    }
}

fn decompression_error(entry: &ArchiveEntry, err: InflateError) -> Error {
    Error::Decompression {
        entry: entry.name.clone(),
        reason: err.0,
    }
}

/// Feed one input chunk through `inflater`, writing output as it appears.
///
/// Returns whether the deflate stream ended.
async fn pump(
    entry: &ArchiveEntry,
    inflater: &mut dyn Inflate,
    input: &[u8],
    output: &mut [u8],
    out: &mut Output,
) -> Result<bool> {
    let mut pos = 0;
    loop {
        let status = inflater
            .inflate(&input[pos..], output)
            .map_err(|e| decompression_error(entry, e))?;
        pos += status.consumed;
        if status.produced > 0 {
            out.write(&output[..status.produced]).await?;
        }
        if status.finished {
            return Ok(true);
        }
        if !status.made_progress() {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::backend::Registry;
    use crate::backend::tests::deflate;
    use crate::io::MemoryReader;
    use async_trait::async_trait;
    use rstest::rstest;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn entry(name: &str, method: CompressionMethod, compressed: u64, uncompressed: u64) -> ArchiveEntry {
        ArchiveEntry {
            name: name.into(),
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            compression_method: method,
            data_offset: 0,
            header_offset: 0,
            has_data_descriptor: false,
            encrypted: false,
            crc32: 0,
            last_mod_time: 0,
            last_mod_date: 0,
        }
    }

    async fn extract(archive: Vec<u8>, entry: &ArchiveEntry, options: &ExtractOptions) -> (WorkerResult, TempDir) {
        let dir = TempDir::new().unwrap();
        let reader = MemoryReader::new(archive);
        let backend = Registry::new().resolve(None).unwrap();
        let dirs = DirectoryCache::rooted_at(dir.path());
        let worker = Worker {
            reader: &reader,
            backend: &backend,
            dirs: &dirs,
            destination: dir.path(),
            options,
        };
        (worker.extract(entry).await, dir)
    }

    /// Source whose every read fails at the device.
    struct FailingReader;

    #[async_trait]
    impl ReadAt for FailingReader {
        async fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> Result<usize> {
            Err(Error::Io(std::io::Error::other("device error")))
        }

        fn size(&self) -> u64 {
            1000
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 13) as u8).collect()
    }

    #[tokio::test]
    async fn inflates_through_tiny_chunks() {
        let data = payload(10_000);
        let compressed = deflate(&data);
        let e = entry("nested/out.bin", CompressionMethod::Deflated, compressed.len() as u64, 10_000);
        let options = ExtractOptions::default().buffer_size(7);

        let (result, dir) = extract(compressed, &e, &options).await;
        let path = result.outcome.unwrap();
        assert_eq!(path, dir.path().join("nested").join("out.bin"));
        assert_eq!(result.bytes_written, 10_000);
        assert_eq!(std::fs::read(path).unwrap(), data);
    }

    #[tokio::test]
    async fn cancellation_is_observed_at_the_first_chunk() {
        let data = payload(100);
        let e = entry("a.bin", CompressionMethod::Stored, 100, 100);
        let token = CancellationToken::new();
        token.cancel();
        let options = ExtractOptions::default().cancel_on(token);

        let (result, _dir) = extract(data, &e, &options).await;
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::Cancelled);
        assert_eq!(result.bytes_written, 0);
    }

    #[tokio::test]
    async fn payload_past_the_end_is_malformed() {
        let e = entry("a.bin", CompressionMethod::Stored, 500, 500);
        let (result, _dir) = extract(payload(200), &e, &ExtractOptions::default()).await;
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::MalformedArchive);
    }

    #[tokio::test]
    async fn cut_deflate_stream_is_a_decompression_error() {
        let compressed = deflate(&payload(50_000));
        let half = compressed.len() as u64 / 2;
        let e = entry("a.bin", CompressionMethod::Deflated, half, 50_000);

        let (result, _dir) = extract(compressed, &e, &ExtractOptions::default()).await;
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::DecompressionError);
        assert!(result.bytes_written < 50_000);
    }

    #[tokio::test]
    async fn failed_atomic_write_leaves_nothing_behind() {
        let e = entry("a.bin", CompressionMethod::Stored, 4, 9);
        let options = ExtractOptions::default().atomic_writes(true);

        let (result, dir) = extract(b"abcd".to_vec(), &e, &options).await;
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::SizeMismatch);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn directory_entries_write_no_file() {
        let e = entry("sub/dir/", CompressionMethod::Stored, 0, 0);
        let (result, dir) = extract(Vec::new(), &e, &ExtractOptions::default()).await;
        assert!(result.outcome.unwrap().is_dir());
        assert!(dir.path().join("sub").join("dir").is_dir());
    }

    #[rstest]
    #[case::stored(CompressionMethod::Stored)]
    #[case::deflated(CompressionMethod::Deflated)]
    #[tokio::test]
    async fn read_errors_keep_their_io_kind(#[case] method: CompressionMethod) {
        let dir = TempDir::new().unwrap();
        let backend = Registry::new().resolve(None).unwrap();
        let dirs = DirectoryCache::rooted_at(dir.path());
        let options = ExtractOptions::default();
        let worker = Worker {
            reader: &FailingReader,
            backend: &backend,
            dirs: &dirs,
            destination: dir.path(),
            options: &options,
        };

        let result = worker.extract(&entry("a.bin", method, 500, 500)).await;
        let err = result.outcome.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure, "{err}");
        assert!(err.to_string().contains("device error"), "{err}");
    }
}
