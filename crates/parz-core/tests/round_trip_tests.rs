mod common;

use std::fs;

use parz_core::format::browse;
use parz_core::{BrowseSpec, DecompressionSpec, ResultType};

use common::{compress_paths, decompress_to, mixed_bytes, pseudo_random_bytes, quiet_archiver, write_file};

fn round_trip(data: &[u8], block_size: u32, threads: usize) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = write_file(dir.path(), "input.bin", data)?;
    let archive = dir.path().join("input.parz");

    let compressed = compress_paths(&archive, &[input], block_size, threads)?;
    assert_eq!(compressed.result, ResultType::Success, "block size {block_size}");

    let restored_path = dir.path().join("restored.bin");
    let restored = decompress_to(&archive, &restored_path, threads);
    assert_eq!(restored.result, ResultType::Success, "block size {block_size}");
    assert_eq!(fs::read(&restored_path)?, data, "block size {block_size}");
    Ok(())
}

#[test]
fn round_trips_across_block_sizes() -> Result<(), Box<dyn std::error::Error>> {
    let data = mixed_bytes(20_000);
    for block_size in [1, 7, 512, 4096, 20_000, 65_536] {
        let sample = if block_size == 1 { &data[..1500] } else { &data[..] };
        round_trip(sample, block_size, 3)?;
    }
    Ok(())
}

#[test]
fn single_thread_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    round_trip(&pseudo_random_bytes(50_000), 4096, 1)
}

#[test]
fn zero_length_file_has_one_empty_block() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = write_file(dir.path(), "empty.bin", &[])?;
    let archive = dir.path().join("empty.parz");

    let result = compress_paths(&archive, &[input], 1024, 2)?;
    assert_eq!(result.result, ResultType::Success);

    let metadata = browse(&archive)?;
    let object = metadata.find("empty.bin").ok_or("object missing")?;
    assert_eq!(object.original_size, 0);

    let bytes = fs::read(&archive)?;
    let stream_start = object.data_offset as usize;
    let stream_end = stream_start + object.compressed_size as usize;
    let stream = &bytes[stream_start..stream_end];
    assert_eq!(&stream[..8], &1i64.to_le_bytes());
    assert_eq!(&stream[stream.len() - 4..], &0i32.to_le_bytes());
    let payload_len = i32::from_le_bytes([stream[8], stream[9], stream[10], stream[11]]) as usize;
    assert_eq!(stream.len(), 8 + 4 + payload_len + 4);

    let restored_path = dir.path().join("empty.out");
    let restored = decompress_to(&archive, &restored_path, 2);
    assert_eq!(restored.result, ResultType::Success);
    assert!(fs::read(&restored_path)?.is_empty());
    Ok(())
}

#[test]
fn ten_mebibytes_with_small_blocks() -> Result<(), Box<dyn std::error::Error>> {
    const SIZE: usize = 10 * 1024 * 1024;
    let dir = tempfile::tempdir()?;
    let data = mixed_bytes(SIZE);
    let input = write_file(dir.path(), "large.bin", &data)?;
    let archive = dir.path().join("large.parz");

    let compressed = compress_paths(&archive, &[input], 64 * 1024, 4)?;
    assert_eq!(compressed.result, ResultType::Success);
    assert_eq!(compressed.tasks.len(), 1);
    assert_eq!(compressed.tasks[0].original_size, SIZE as u64);

    let browsed = quiet_archiver().browse(BrowseSpec::new(&archive));
    let metadata = browsed.archive.ok_or("browse returned no metadata")?;
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata.objects[0].original_size, (10 * 1024 * 1024) as u64);
    assert_eq!(metadata.block_size, 64 * 1024);
    assert_eq!(metadata.objects[0].compressed_size, compressed.tasks[0].compressed_size);

    let restored_path = dir.path().join("large.out");
    let restored = decompress_to(&archive, &restored_path, 4);
    assert_eq!(restored.result, ResultType::Success);
    assert_eq!(fs::read(&restored_path)?, data);
    Ok(())
}

#[test]
fn directory_round_trips_into_directory() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("tree");
    fs::create_dir_all(source.join("sub"))?;
    write_file(&source, "a.txt", b"alpha")?;
    write_file(&source.join("sub"), "b.txt", &mixed_bytes(9000))?;
    let archive = dir.path().join("tree.parz");

    let compressed = compress_paths(&archive, &[source.clone()], 1024, 2)?;
    assert_eq!(compressed.result, ResultType::Success);
    assert_eq!(compressed.tasks.len(), 2);

    let out = dir.path().join("out");
    fs::create_dir_all(&out)?;
    let restored = decompress_to(&archive, &out, 2);
    assert_eq!(restored.result, ResultType::Success);
    assert_eq!(fs::read(out.join("tree/a.txt"))?, b"alpha");
    assert_eq!(fs::read(out.join("tree/sub/b.txt"))?, mixed_bytes(9000));

    let single_target = dir.path().join("only_b.txt");
    let single = quiet_archiver().decompress(
        DecompressionSpec::new(&archive, &single_target)
            .with_inside_paths(vec!["tree/sub/b.txt".to_string()]),
    );
    assert_eq!(single.result, ResultType::Success);
    assert_eq!(fs::read(&single_target)?, mixed_bytes(9000));

    let ambiguous = decompress_to(&archive, &dir.path().join("which.bin"), 2);
    assert_eq!(ambiguous.result, ResultType::Failed);
    Ok(())
}
