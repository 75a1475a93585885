//! Extraction engine and its public entry points.
//!
//! - [`unzip`]: extract an archive on disk
//! - [`unzip_stream`]: spool a chunk stream, then extract it
//! - [`unzip_reader`]: extract from any [`ReadAt`] source
//!
//! All three return `Ok(report)` only when every selected entry was
//! extracted. Otherwise the report comes back inside
//! [`Error::EntriesFailed`].

mod path;
mod report;
mod scheduler;
mod worker;

pub use path::{DirectoryCache, partial_path, resolve};
pub use report::{EntryFailure, ExtractedEntry, ExtractionReport, WorkerResult};
pub use scheduler::{Scheduler, SchedulerState};
pub use worker::Worker;

use std::io;
use std::path::Path;
use std::sync::Arc;

use futures::Stream;

use crate::backend::Registry;
use crate::error::{Error, Result};
use crate::io::{LocalFileReader, ReadAt, SpoolMode, spool};
use crate::options::ExtractOptions;
use crate::zip::{ArchiveEntry, EntryFilter, ReadStrategy, ZipParser};

/// Extract the archive at `archive` under `destination`.
pub async fn unzip(
    archive: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<ExtractionReport> {
    let filter = filter_for(options)?;
    let reader = Arc::new(LocalFileReader::new(archive.as_ref())?);
    run(reader, filter, destination.as_ref(), options).await
}

/// Extract from an already open byte source.
pub async fn unzip_reader<R: ReadAt + ?Sized>(
    reader: Arc<R>,
    destination: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<ExtractionReport> {
    let filter = filter_for(options)?;
    run(reader, filter, destination.as_ref(), options).await
}

/// Spool `chunks` according to `spool_mode`, then extract.
///
/// The spool is released when this returns, whatever the outcome.
pub async fn unzip_stream<S, B>(
    chunks: S,
    destination: impl AsRef<Path>,
    options: &ExtractOptions,
    spool_mode: &SpoolMode,
) -> Result<ExtractionReport>
where
    S: Stream<Item = io::Result<B>>,
    B: AsRef<[u8]>,
{
    // Reject bad filters before consuming a stream that cannot be replayed.
    let filter = filter_for(options)?;
    let spooled = Arc::new(spool(chunks, spool_mode).await?);
    let result = run(spooled.clone(), filter, destination.as_ref(), options).await;
    drop(spooled);
    result
}

/// Read the catalog of the archive at `archive`.
pub async fn list(archive: impl AsRef<Path>, strategy: ReadStrategy) -> Result<Vec<ArchiveEntry>> {
    let reader = Arc::new(LocalFileReader::new(archive.as_ref())?);
    ZipParser::new(reader).read_catalog(strategy).await
}

fn filter_for(options: &ExtractOptions) -> Result<EntryFilter> {
    EntryFilter::new(&options.files, &options.regex_files)
}

async fn run<R: ReadAt + ?Sized>(
    reader: Arc<R>,
    filter: EntryFilter,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport> {
    // Both of these are fatal to the whole run.
    let backend = Registry::global().resolve(options.backend.as_deref())?;
    let catalog = ZipParser::new(reader.clone()).read_catalog(options.strategy).await?;

    let destination = std::path::absolute(destination).map_err(Error::io_at(destination))?;
    let plan = filter.select(catalog, destination);
    plan.ensure_supported()?;
    if plan.is_empty() {
        tracing::info!("no entries selected");
        return Ok(ExtractionReport::default());
    }

    tracing::info!(
        entries = plan.len(),
        backend = backend.name(),
        workers = options.workers(),
        destination = %plan.destination.display(),
        "extracting"
    );

    tokio::fs::create_dir_all(&plan.destination)
        .await
        .map_err(Error::io_at(&plan.destination))?;
    let dirs = DirectoryCache::rooted_at(&plan.destination);

    let worker = Worker {
        reader: &*reader,
        backend: &backend,
        dirs: &dirs,
        destination: &plan.destination,
        options,
    };
    let mut scheduler = Scheduler::new(worker, options);
    let mut report = scheduler.run(&plan.entries).await;
    report.directories_created = dirs.created();

    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        bytes = report.bytes_written(),
        "extraction finished"
    );
    report.into_result()
}
