use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::tail::TailEntry;

/// One object stored in an archive.
///
/// `original_path` is only known on the producer side and stays empty for
/// objects decoded from archive bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInArchive {
    pub inside_path: String,
    pub original_path: PathBuf,
    pub original_size: u64,
    /// Length of the on-disk block stream; zero until compression finishes.
    pub compressed_size: u64,
    pub header_offset: u64,
    pub data_offset: u64,
}

impl ObjectInArchive {
    /// Object scanned from the file system, not yet placed in an archive.
    pub fn from_source(
        inside_path: impl Into<String>,
        original_path: impl Into<PathBuf>,
        original_size: u64,
    ) -> Self {
        Self {
            inside_path: inside_path.into(),
            original_path: original_path.into(),
            original_size,
            ..Self::default()
        }
    }

    pub fn tail_entry(&self) -> TailEntry {
        TailEntry {
            header_offset: self.header_offset,
            compressed_size: self.compressed_size,
        }
    }
}

/// Decoded archive contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub block_size: u32,
    pub objects: Vec<ObjectInArchive>,
    /// Non-fatal problems found while decoding, such as damaged separators.
    pub warnings: Vec<String>,
}

impl ArchiveMetadata {
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            objects: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn find(&self, inside_path: &str) -> Option<&ObjectInArchive> {
        self.objects
            .iter()
            .find(|object| object.inside_path == inside_path)
    }

    pub fn contains(&self, inside_path: &str) -> bool {
        self.find(inside_path).is_some()
    }

    pub fn tail_entries(&self) -> Vec<TailEntry> {
        self.objects.iter().map(ObjectInArchive::tail_entry).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn total_original_size(&self) -> u64 {
        self.objects.iter().map(|object| object.original_size).sum()
    }
}
