use std::io::{Read, Seek, SeekFrom};

use crate::{ParzError, Result};

use super::headers::{check_separator, check_trailer, encode_trailer};
use super::{
    ARCHIVE_HEADER_SIZE, MIN_TAIL_SIZE, RECORD_SEPARATOR, RECORD_TRAILER_SIZE, TAIL_ENTRY_SIZE,
    TAIL_LOCATOR_DISTANCE,
};

/// One `(header offset, compressed size)` pair listed in the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailEntry {
    pub header_offset: u64,
    pub compressed_size: u64,
}

/// Archive tail: the directory of every object header in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveTail {
    pub entries: Vec<TailEntry>,
}

impl ArchiveTail {
    pub fn new(entries: Vec<TailEntry>) -> Self {
        Self { entries }
    }

    /// Encodes the tail that will start at `tail_start`.
    pub fn encode(&self, tail_start: u64) -> Result<Vec<u8>> {
        let count = i32::try_from(self.entries.len())
            .map_err(|_| ParzError::InvalidFormat("too many objects for one archive"))?;

        let payload_len = 4 + self.entries.len() * TAIL_ENTRY_SIZE + 8;
        let mut out = Vec::with_capacity(4 + payload_len + RECORD_TRAILER_SIZE);
        out.extend_from_slice(&RECORD_SEPARATOR);
        out.extend_from_slice(&count.to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&to_i64(entry.header_offset)?.to_le_bytes());
            out.extend_from_slice(&to_i64(entry.compressed_size)?.to_le_bytes());
        }
        out.extend_from_slice(&to_i64(tail_start)?.to_le_bytes());

        let crc = crc32fast::hash(&out[4..]);
        let trailer_at = out.len();
        out.resize(trailer_at + RECORD_TRAILER_SIZE, 0);
        encode_trailer(&mut out[trailer_at..], crc);
        Ok(out)
    }

    /// Locates the tail from the end of the archive and validates it.
    ///
    /// Returns the tail and the offset at which it starts.
    pub fn read<R: Read + Seek>(reader: &mut R, warnings: &mut Vec<String>) -> Result<(Self, u64)> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        if file_len < ARCHIVE_HEADER_SIZE as u64 + MIN_TAIL_SIZE {
            return Err(ParzError::Truncated {
                record: "archive tail",
            });
        }

        reader.seek(SeekFrom::End(-(TAIL_LOCATOR_DISTANCE as i64)))?;
        let mut locator = [0u8; 8];
        reader
            .read_exact(&mut locator)
            .map_err(|error| ParzError::from_read(error, "archive tail"))?;
        let tail_start = i64::from_le_bytes(locator);
        if tail_start < ARCHIVE_HEADER_SIZE as i64
            || tail_start as u64 > file_len - MIN_TAIL_SIZE
        {
            return Err(ParzError::InvalidFormat("tail offset points outside the archive"));
        }
        let tail_start = tail_start as u64;

        reader.seek(SeekFrom::Start(tail_start))?;
        let mut bytes = vec![0u8; (file_len - tail_start) as usize];
        reader
            .read_exact(&mut bytes)
            .map_err(|error| ParzError::from_read(error, "archive tail"))?;

        check_separator(&bytes[..4], "archive tail", warnings);
        let trailer_at = bytes.len() - RECORD_TRAILER_SIZE;
        let crc = crc32fast::hash(&bytes[4..trailer_at]);
        check_trailer(&bytes[trailer_at..], "archive tail", crc, warnings)?;

        let count = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if count < 0 {
            return Err(ParzError::InvalidFormat("negative object count in archive tail"));
        }
        let count = count as usize;
        if 8 + count * TAIL_ENTRY_SIZE + 8 != trailer_at {
            return Err(ParzError::InvalidFormat(
                "archive tail length does not match its object count",
            ));
        }

        let mut entries = Vec::with_capacity(count);
        for index in 0..count {
            let at = 8 + index * TAIL_ENTRY_SIZE;
            let header_offset = read_i64(&bytes[at..at + 8]);
            let compressed_size = read_i64(&bytes[at + 8..at + 16]);
            if header_offset <= ARCHIVE_HEADER_SIZE as i64 || header_offset as u64 >= tail_start {
                return Err(ParzError::InvalidFormat("object header offset out of range"));
            }
            if compressed_size < 0 {
                return Err(ParzError::InvalidFormat("negative compressed size in archive tail"));
            }
            entries.push(TailEntry {
                header_offset: header_offset as u64,
                compressed_size: compressed_size as u64,
            });
        }

        Ok((Self { entries }, tail_start))
    }
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    i64::from_le_bytes(raw)
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| ParzError::InvalidFormat("offset exceeds i64 range"))
}
