mod common;

use std::fs;
use std::sync::Arc;

use rstest::rstest;
use tempfile::TempDir;

use async_unzip::zip::ZipParser;
use async_unzip::{CompressionMethod, ErrorKind, ExtractOptions, MemoryReader, ReadStrategy, list, unzip_reader};
use common::{ZipBuilder, text};

async fn catalog(bytes: Vec<u8>, strategy: ReadStrategy) -> async_unzip::Result<Vec<async_unzip::ArchiveEntry>> {
    ZipParser::new(Arc::new(MemoryReader::new(bytes))).read_catalog(strategy).await
}

fn descriptor_archive() -> ZipBuilder {
    ZipBuilder::new()
        .streamed("first.txt", &text(40_000, 1))
        .stored("middle.txt", b"middle")
        .streamed("last.txt", &text(3, 2))
        .dir("dir/")
}

#[rstest]
#[case(ReadStrategy::Auto)]
#[case(ReadStrategy::CentralDirectory)]
#[case(ReadStrategy::LocalHeaders)]
#[tokio::test]
async fn strategies_agree_on_the_catalog(#[case] strategy: ReadStrategy) {
    let entries = catalog(descriptor_archive().finish(), strategy).await.unwrap();

    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["first.txt", "middle.txt", "last.txt", "dir/"]);
    assert_eq!(entries[0].uncompressed_size, 40_000);
    assert_eq!(entries[0].compression_method, CompressionMethod::Deflated);
    assert!(entries[0].has_data_descriptor);
    assert_eq!(entries[0].crc32, crc32fast::hash(&text(40_000, 1)));
    assert_eq!(entries[1].compressed_size, 6);
    assert_eq!(entries[2].uncompressed_size, 3);
    assert!(entries[3].is_dir());
    assert_eq!(entries[1].mod_date(), (2025, 1, 1));
    assert_eq!(entries[1].mod_time(), (12, 30, 0));
}

#[tokio::test]
async fn local_scan_recovers_archives_without_a_central_directory() {
    let bytes = descriptor_archive().finish_without_central_directory();
    assert_eq!(
        catalog(bytes.clone(), ReadStrategy::CentralDirectory).await.unwrap_err().kind(),
        ErrorKind::MalformedArchive
    );

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let report = unzip_reader(Arc::new(MemoryReader::new(bytes)), &out, &ExtractOptions::default())
        .await
        .unwrap();
    assert_eq!(report.succeeded.len(), 4);
    assert_eq!(fs::read(out.join("first.txt")).unwrap(), text(40_000, 1));
    assert_eq!(fs::read(out.join("last.txt")).unwrap(), text(3, 2));
}

#[tokio::test]
async fn disagreeing_descriptor_is_a_size_mismatch() {
    let bytes = ZipBuilder::new()
        .disagreeing_descriptor("a.txt", &text(1_000, 0), 999)
        .finish();

    let err = catalog(bytes.clone(), ReadStrategy::LocalHeaders).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    // the central directory carries the real sizes
    assert_eq!(catalog(bytes, ReadStrategy::CentralDirectory).await.unwrap()[0].uncompressed_size, 1_000);
}

#[tokio::test]
async fn eocd_is_found_behind_a_comment() {
    let bytes = ZipBuilder::new()
        .stored("a.txt", b"a")
        .finish_with_comment(&[b'x'; 1000]);
    let entries = catalog(bytes, ReadStrategy::CentralDirectory).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn empty_archive_has_an_empty_catalog() {
    let entries = catalog(ZipBuilder::new().finish(), ReadStrategy::Auto).await.unwrap();
    assert!(entries.is_empty());
}

#[rstest]
#[case::empty(Vec::new())]
#[case::text(b"this is plainly not a zip archive, only some text that goes on".to_vec())]
#[case::bare_signature(b"PK\x03\x04".to_vec())]
#[tokio::test]
async fn non_archives_are_malformed(#[case] bytes: Vec<u8>, #[values(ReadStrategy::Auto, ReadStrategy::LocalHeaders)] strategy: ReadStrategy) {
    let err = catalog(bytes, strategy).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedArchive);
}

#[tokio::test]
async fn list_reads_an_archive_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.zip");
    fs::write(&path, ZipBuilder::new().deflated("x/y.txt", b"hello").finish()).unwrap();

    let entries = list(&path, ReadStrategy::Auto).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "x/y.txt");
    assert_eq!(entries[0].uncompressed_size, 5);
}
