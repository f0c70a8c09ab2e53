use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::telemetry::{self, Counter, tags};
use crate::{ParzError, Result};

use super::{
    ArchiveHeader, ArchiveMetadata, ArchiveTail, ObjectHeader, RECORD_SEPARATOR, TailEntry,
};

/// Position of an [`ArchiveWriter`] in the write-side record sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Created,
    HeaderWritten,
    ObjectHeaderWritten,
    ObjectDataWritten,
    TailWritten,
}

/// Where an object header landed and where its block stream must start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPlacement {
    pub header_offset: u64,
    pub data_offset: u64,
}

/// Write side of the archive codec.
///
/// Owns the metadata records only. Block streams are appended to the same
/// file by the pipeline writer between [`ArchiveWriter::begin_object`] and
/// [`ArchiveWriter::finish_object`].
#[derive(Debug)]
pub struct ArchiveWriter {
    file: File,
    path: PathBuf,
    block_size: u32,
    state: WriteState,
    entries: Vec<TailEntry>,
    current: Option<ObjectPlacement>,
}

impl ArchiveWriter {
    /// Creates a new archive file and writes its header.
    ///
    /// # Errors
    /// Fails if the file already exists.
    pub fn create(path: &Path, block_size: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|error| {
                ParzError::from(error).with_context(format!("create {}", path.display()))
            })?;

        let mut writer = Self {
            file,
            path: path.to_path_buf(),
            block_size,
            state: WriteState::Created,
            entries: Vec::new(),
            current: None,
        };
        writer.write_header()?;
        Ok(writer)
    }

    /// Opens an existing archive for appending, keeping its current objects
    /// as the first tail entries.
    pub fn append(path: &Path, existing: &ArchiveMetadata) -> Result<Self> {
        let file = OpenOptions::new().write(true).open(path).map_err(|error| {
            ParzError::from(error).with_context(format!("open {}", path.display()))
        })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            block_size: existing.block_size,
            state: WriteState::HeaderWritten,
            entries: existing.tail_entries(),
            current: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    /// Tail entries accumulated so far, prior objects first.
    pub fn entries(&self) -> &[TailEntry] {
        &self.entries
    }

    fn write_header(&mut self) -> Result<()> {
        self.expect_state(&[WriteState::Created], "archive header")?;
        ArchiveHeader::new(self.block_size).write(&mut self.file)?;
        self.file.flush()?;
        record_written("archive header");
        self.state = WriteState::HeaderWritten;
        Ok(())
    }

    /// Appends an object header at the end of the file.
    pub fn begin_object(&mut self, inside_path: &str, original_size: u64) -> Result<ObjectPlacement> {
        self.expect_state(
            &[WriteState::HeaderWritten, WriteState::ObjectDataWritten],
            "object header",
        )?;

        let record = ObjectHeader::new(inside_path, original_size).encode()?;
        let start = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&RECORD_SEPARATOR)?;
        self.file.write_all(&record)?;
        self.file.flush()?;

        let header_offset = start + RECORD_SEPARATOR.len() as u64;
        let placement = ObjectPlacement {
            header_offset,
            data_offset: header_offset + record.len() as u64,
        };
        record_written("object header");
        tracing::debug!(
            target: tags::TARGET_FORMAT,
            inside_path,
            header_offset = placement.header_offset,
            data_offset = placement.data_offset,
            "object header written"
        );

        self.current = Some(placement);
        self.state = WriteState::ObjectHeaderWritten;
        Ok(placement)
    }

    /// Records the block stream of the current object for the tail.
    ///
    /// # Errors
    /// Fails if the file does not end exactly where the block stream should.
    pub fn finish_object(&mut self, compressed_size: u64) -> Result<TailEntry> {
        self.expect_state(&[WriteState::ObjectHeaderWritten], "object data")?;
        let placement = self
            .current
            .take()
            .ok_or(ParzError::InvalidFormat("no object header pending"))?;

        let file_len = self.file.metadata()?.len();
        if file_len != placement.data_offset + compressed_size {
            return Err(ParzError::InvalidFormat(
                "block stream length does not match the archive size",
            ));
        }

        let entry = TailEntry {
            header_offset: placement.header_offset,
            compressed_size,
        };
        self.entries.push(entry);
        self.state = WriteState::ObjectDataWritten;
        Ok(entry)
    }

    /// Drops the current object from the tail; its bytes stay as dead space.
    pub fn discard_object(&mut self) {
        if let Some(placement) = self.current.take() {
            tracing::debug!(
                target: tags::TARGET_FORMAT,
                header_offset = placement.header_offset,
                "object left out of the tail"
            );
            self.state = WriteState::ObjectDataWritten;
        }
    }

    /// Writes the tail listing every recorded entry and syncs the file.
    pub fn write_tail(&mut self) -> Result<u64> {
        self.expect_state(
            &[WriteState::HeaderWritten, WriteState::ObjectDataWritten],
            "archive tail",
        )?;

        let tail_start = self.file.seek(SeekFrom::End(0))?;
        let bytes = ArchiveTail::new(self.entries.clone()).encode(tail_start)?;
        self.file.write_all(&bytes)?;
        self.file.sync_all()?;

        record_written("archive tail");
        tracing::debug!(
            target: tags::TARGET_FORMAT,
            objects = self.entries.len(),
            tail_start,
            "archive tail written"
        );
        self.state = WriteState::TailWritten;
        Ok(tail_start)
    }

    fn expect_state(&self, allowed: &[WriteState], record: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            tracing::error!(
                target: tags::TARGET_FORMAT,
                record,
                state = ?self.state,
                "archive record written out of order"
            );
            Err(ParzError::InvalidFormat("archive record written out of order"))
        }
    }
}

fn record_written(record: &'static str) {
    telemetry::count(Counter::RecordsWritten, 1);
    tracing::trace!(target: tags::TARGET_FORMAT, record, "archive record written");
}
