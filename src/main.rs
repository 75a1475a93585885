//! Command-line front end for async-unzip.
//!
//! Sources can be a local file, an HTTP URL, or standard input. Streamed
//! sources are spooled before the catalog is read.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;

use async_unzip::io::{http, spool};
use async_unzip::zip::ZipParser;
use async_unzip::{ArchiveEntry, Cli, Error, ExtractionReport, ReadAt, ReadStrategy, Registry, unzip, unzip_stream};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if cli.list_backends {
        for name in Registry::global().available() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if cli.list {
        let entries = read_catalog(&cli).await?;
        print_listing(&entries);
        return Ok(ExitCode::SUCCESS);
    }

    let options = cli.options();
    let result = if cli.is_http_url() {
        let chunks = http::download(&cli.source).await?;
        unzip_stream(chunks, &cli.extract_dir, &options, &cli.spool_mode()).await
    } else if cli.is_stdin() {
        let chunks = ReaderStream::new(tokio::io::stdin());
        unzip_stream(chunks, &cli.extract_dir, &options, &cli.spool_mode()).await
    } else {
        unzip(&cli.source, &cli.extract_dir, &options).await
    };

    match result {
        Ok(report) => {
            if !cli.is_quiet() {
                print_summary(&report);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::EntriesFailed(report)) => {
            if !cli.is_very_quiet() {
                print_failures(&report);
            }
            if !cli.is_quiet() {
                print_summary(&report);
            }
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err).with_context(|| format!("cannot extract '{}'", cli.source)),
    }
}

/// Log to stderr: warnings by default, everything with `-v`, errors only with `-qq`.
///
/// `RUST_LOG` overrides all of these.
fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.is_very_quiet() {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn read_catalog(cli: &Cli) -> Result<Vec<ArchiveEntry>> {
    let strategy: ReadStrategy = cli.strategy.into();
    let entries = if cli.is_http_url() {
        let spooled = spool(http::download(&cli.source).await?, &cli.spool_mode()).await?;
        catalog_of(Arc::new(spooled), strategy).await?
    } else if cli.is_stdin() {
        let spooled = spool(ReaderStream::new(tokio::io::stdin()), &cli.spool_mode()).await?;
        catalog_of(Arc::new(spooled), strategy).await?
    } else {
        async_unzip::list(&cli.source, strategy).await?
    };
    Ok(entries)
}

async fn catalog_of<R: ReadAt>(reader: Arc<R>, strategy: ReadStrategy) -> Result<Vec<ArchiveEntry>> {
    Ok(ZipParser::new(reader).read_catalog(strategy).await?)
}

fn print_listing(entries: &[ArchiveEntry]) {
    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.name
        );

        if !entry.is_dir() {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>17}  {} file{}",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count,
        if file_count == 1 { "" } else { "s" }
    );
}

/// Space saved, as a percentage column.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed == 0 {
        return "   0%".to_string();
    }
    let saved = 100 - (compressed.saturating_mul(100) / uncompressed).min(100);
    format!("{saved:>4}%")
}

fn print_summary(report: &ExtractionReport) {
    eprintln!(
        "extracted {} of {} entries ({}), {} directories created",
        report.succeeded.len(),
        report.total(),
        format_size(report.bytes_written()),
        report.directories_created
    );
    if !report.skipped.is_empty() {
        eprintln!("{} entries skipped", report.skipped.len());
    }
}

fn print_failures(report: &ExtractionReport) {
    for failure in &report.failed {
        eprintln!("  failed: {}: {}", failure.name, failure.error);
    }
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
