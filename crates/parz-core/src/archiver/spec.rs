use std::path::{Path, PathBuf};

use crate::format::ObjectInArchive;
use crate::types::{DEFAULT_BLOCK_SIZE, Mode};
use crate::Result;

use super::objects::collect_objects;

/// Request for one archiver run, one variant per mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingSpec {
    Compress(CompressionSpec),
    Append(CompressionSpec),
    Decompress(DecompressionSpec),
    Browse(BrowseSpec),
}

impl ProcessingSpec {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Compress(_) => Mode::Compress,
            Self::Append(_) => Mode::Append,
            Self::Decompress(_) => Mode::Decompress,
            Self::Browse(_) => Mode::Browse,
        }
    }

    pub fn archive_path(&self) -> &Path {
        match self {
            Self::Compress(spec) | Self::Append(spec) => &spec.archive_path,
            Self::Decompress(spec) => &spec.archive_path,
            Self::Browse(spec) => &spec.archive_path,
        }
    }
}

/// Objects to pack into a new archive or append to an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionSpec {
    pub archive_path: PathBuf,
    pub objects: Vec<ObjectInArchive>,
    pub thread_count: usize,
    /// Requested block size. Compress falls back to the default; append
    /// falls back to the archive's own block size.
    pub block_size: Option<u32>,
}

impl CompressionSpec {
    pub fn new(archive_path: impl Into<PathBuf>, objects: Vec<ObjectInArchive>) -> Self {
        Self {
            archive_path: archive_path.into(),
            objects,
            thread_count: num_cpus::get().max(1),
            block_size: None,
        }
    }

    /// Scans `sources` into an object list.
    pub fn from_sources(archive_path: impl Into<PathBuf>, sources: &[PathBuf]) -> Result<Self> {
        Ok(Self::new(archive_path, collect_objects(sources)?))
    }

    pub fn with_threads(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub(crate) fn block_size_or_default(&self) -> u32 {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }
}

/// Objects to restore from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressionSpec {
    pub archive_path: PathBuf,
    /// Output file, or directory when restoring several objects.
    pub target_path: PathBuf,
    pub inside_paths: Vec<String>,
    pub thread_count: usize,
}

impl DecompressionSpec {
    pub fn new(archive_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            target_path: target_path.into(),
            inside_paths: Vec::new(),
            thread_count: num_cpus::get().max(1),
        }
    }

    pub fn with_inside_paths(mut self, inside_paths: Vec<String>) -> Self {
        self.inside_paths = inside_paths;
        self
    }

    pub fn with_threads(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseSpec {
    pub archive_path: PathBuf,
}

impl BrowseSpec {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
        }
    }
}
