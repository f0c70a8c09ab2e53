#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parz_core::archiver::collect_objects;
use parz_core::{
    Archiver, CompressionSpec, DecompressionSpec, NoopWorkload, NullSink, ProcessingResult,
};

pub fn pseudo_random_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x1234_5678_9ABC_DEF0u64;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((state >> 56) as u8);
    }
    out
}

/// Mixes random runs with repeated text so blocks actually shrink.
pub fn mixed_bytes(len: usize) -> Vec<u8> {
    let noise = pseudo_random_bytes(len);
    let text = b"the quick brown fox jumps over the lazy dog ";
    noise
        .iter()
        .enumerate()
        .map(|(index, byte)| {
            if (index / 512) % 2 == 0 {
                text[index % text.len()]
            } else {
                *byte
            }
        })
        .collect()
}

pub fn quiet_archiver() -> Archiver {
    Archiver::new(Arc::new(NullSink), Arc::new(NoopWorkload))
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, data)?;
    Ok(path)
}

pub fn compress_paths(
    archive: &Path,
    sources: &[PathBuf],
    block_size: u32,
    threads: usize,
) -> Result<ProcessingResult, Box<dyn std::error::Error>> {
    let spec = CompressionSpec::new(archive, collect_objects(sources)?)
        .with_block_size(block_size)
        .with_threads(threads);
    Ok(quiet_archiver().compress(spec))
}

pub fn append_paths(
    archive: &Path,
    sources: &[PathBuf],
    threads: usize,
) -> Result<ProcessingResult, Box<dyn std::error::Error>> {
    let spec = CompressionSpec::new(archive, collect_objects(sources)?).with_threads(threads);
    Ok(quiet_archiver().append(spec))
}

pub fn decompress_to(archive: &Path, target: &Path, threads: usize) -> ProcessingResult {
    quiet_archiver().decompress(DecompressionSpec::new(archive, target).with_threads(threads))
}
