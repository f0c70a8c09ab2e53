use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::telemetry::tags;
use crate::{ParzError, Result};

use super::headers::check_separator;
use super::{ArchiveHeader, ArchiveMetadata, ArchiveTail, ObjectHeader, ObjectInArchive};

/// Read side of the archive codec: header, tail, then every object header.
#[derive(Debug)]
pub struct ArchiveReader<R: Read + Seek> {
    reader: R,
    header: ArchiveHeader,
    warnings: Vec<String>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Validates the archive header.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut warnings = Vec::new();
        reader.seek(SeekFrom::Start(0))?;
        let header = ArchiveHeader::read(&mut reader, &mut warnings)?;
        Ok(Self {
            reader,
            header,
            warnings,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.header.block_size
    }

    pub fn header(&self) -> ArchiveHeader {
        self.header
    }

    /// Locates and validates the tail, then decodes every object it lists.
    pub fn read_metadata(mut self) -> Result<ArchiveMetadata> {
        let (tail, tail_start) = ArchiveTail::read(&mut self.reader, &mut self.warnings)?;

        let mut metadata = ArchiveMetadata::new(self.header.block_size);
        let mut seen = HashSet::with_capacity(tail.entries.len());
        for entry in &tail.entries {
            let object = self.read_object(entry.header_offset, entry.compressed_size, tail_start)?;
            if !seen.insert(object.inside_path.clone()) {
                return Err(ParzError::InvalidFormat("duplicate inside path in archive tail"));
            }
            metadata.objects.push(object);
        }
        metadata.warnings = self.warnings;

        tracing::debug!(
            target: tags::TARGET_FORMAT,
            objects = metadata.objects.len(),
            block_size = metadata.block_size,
            tail_start,
            "archive metadata decoded"
        );
        Ok(metadata)
    }

    fn read_object(
        &mut self,
        header_offset: u64,
        compressed_size: u64,
        tail_start: u64,
    ) -> Result<ObjectInArchive> {
        self.reader.seek(SeekFrom::Start(header_offset - 4))?;
        let mut separator = [0u8; 4];
        self.reader
            .read_exact(&mut separator)
            .map_err(|error| ParzError::from_read(error, "object header"))?;
        check_separator(&separator, "object header", &mut self.warnings);

        let (header, record_len) = ObjectHeader::read(&mut self.reader, &mut self.warnings)?;
        let data_offset = header_offset + record_len;
        if data_offset.saturating_add(compressed_size) > tail_start {
            return Err(ParzError::InvalidFormat("object data overlaps the archive tail"));
        }

        Ok(ObjectInArchive {
            inside_path: header.inside_path,
            original_path: Default::default(),
            original_size: header.original_size,
            compressed_size,
            header_offset,
            data_offset,
        })
    }
}

/// Reads the metadata of the archive at `path`.
pub fn browse(path: &Path) -> Result<ArchiveMetadata> {
    let file = File::open(path)
        .map_err(|error| ParzError::from(error).with_context(format!("open {}", path.display())))?;
    ArchiveReader::new(BufReader::new(file))?
        .read_metadata()
        .map_err(|error| error.with_context(format!("read metadata of {}", path.display())))
}
