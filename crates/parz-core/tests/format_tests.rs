mod common;

use std::fs;

use parz_core::format::{ARCHIVE_HEADER_SIZE, RECORD_TRAILER_SIZE, browse};
use parz_core::{BrowseSpec, ErrorKind, ParzError, ResultType};

use common::{compress_paths, mixed_bytes, quiet_archiver, write_file};

struct Fixture {
    _dir: tempfile::TempDir,
    archive: std::path::PathBuf,
    bytes: Vec<u8>,
}

fn fixture() -> Result<Fixture, Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let first = write_file(dir.path(), "first.txt", &mixed_bytes(6000))?;
    let second = write_file(dir.path(), "second.txt", &mixed_bytes(3000))?;
    let archive = dir.path().join("fixture.parz");
    let result = compress_paths(&archive, &[first, second], 1024, 2)?;
    assert_eq!(result.result, ResultType::Success);
    let bytes = fs::read(&archive)?;
    Ok(Fixture {
        _dir: dir,
        archive,
        bytes,
    })
}

fn browse_with_flip(fixture: &Fixture, offset: usize) -> parz_core::Result<usize> {
    let mut bytes = fixture.bytes.clone();
    bytes[offset] ^= 0x5A;
    let damaged = fixture.archive.with_extension("damaged");
    fs::write(&damaged, &bytes)?;
    browse(&damaged).map(|metadata| metadata.warnings.len())
}

fn assert_format_error(result: parz_core::Result<usize>, offset: usize) {
    match result {
        Err(error) => assert_eq!(error.kind(), ErrorKind::Format, "offset {offset}: {error}"),
        Ok(_) => panic!("corruption at offset {offset} was not detected"),
    }
}

#[test]
fn every_checksummed_byte_is_enforced() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture()?;
    let metadata = browse(&fixture.archive)?;
    let tail_start = metadata
        .objects
        .iter()
        .map(|object| object.data_offset + object.compressed_size)
        .max()
        .ok_or("no objects")? as usize;

    let mut offsets: Vec<usize> = (0..12).chain(16..20).collect();
    for object in &metadata.objects {
        let header = object.header_offset as usize;
        let record_end = object.data_offset as usize;
        offsets.extend(header..record_end - RECORD_TRAILER_SIZE);
        offsets.extend(record_end - 8..record_end - 4);
    }
    let tail_end = fixture.bytes.len();
    offsets.extend(tail_start + 4..tail_end - RECORD_TRAILER_SIZE);
    offsets.extend(tail_end - 8..tail_end - 4);

    for offset in offsets {
        assert_format_error(browse_with_flip(&fixture, offset), offset);
    }
    Ok(())
}

#[test]
fn bytes_outside_validated_spans_do_not_fail_browse() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture()?;
    let metadata = browse(&fixture.archive)?;

    for object in &metadata.objects {
        let data = object.data_offset as usize;
        for offset in [data + 12, data + object.compressed_size as usize - 5] {
            assert_eq!(browse_with_flip(&fixture, offset)?, 0, "offset {offset}");
        }
    }

    // Separators are framing only: damage is reported as a warning.
    let separator = ARCHIVE_HEADER_SIZE - 4;
    assert_eq!(browse_with_flip(&fixture, separator)?, 1);
    let object_separator = metadata.objects[1].header_offset as usize - 2;
    assert_eq!(browse_with_flip(&fixture, object_separator)?, 1);
    Ok(())
}

#[test]
fn damaged_archive_fails_the_browse_run() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture()?;
    let mut bytes = fixture.bytes.clone();
    bytes[9] ^= 0x01;
    fs::write(&fixture.archive, &bytes)?;

    let result = quiet_archiver().browse(BrowseSpec::new(&fixture.archive));
    assert_eq!(result.result, ResultType::Failed);
    assert!(result.archive.is_none());

    let error = browse(&fixture.archive).expect_err("header checksum");
    assert!(error.to_string().contains("archive format unsupported or file damaged"));
    Ok(())
}

#[test]
fn truncated_archive_is_a_format_error() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture()?;
    fs::write(&fixture.archive, &fixture.bytes[..fixture.bytes.len() - 3])?;
    let error = browse(&fixture.archive).expect_err("truncated");
    assert_eq!(error.kind(), ErrorKind::Format);

    fs::write(&fixture.archive, &fixture.bytes[..10])?;
    let error = browse(&fixture.archive).expect_err("short header");
    assert!(matches!(error, ParzError::Truncated { record: "archive header" }));
    Ok(())
}
