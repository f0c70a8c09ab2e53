use std::io::{Read, Write};

use crc32fast::Hasher;

use crate::telemetry::{self, Counter, tags};
use crate::{ParzError, Result};

use super::{
    ARCHIVE_HEADER_SIZE, FORMAT_VERSION, MAX_INSIDE_PATH_BYTES, RECORD_SEPARATOR,
    RECORD_TRAILER_SIZE,
};

/// Archive header: version tag and the archive-wide block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub block_size: u32,
}

impl ArchiveHeader {
    pub fn new(block_size: u32) -> Self {
        Self { block_size }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads and validates the header, collecting separator mismatches into `warnings`.
    pub fn read<R: Read>(reader: &mut R, warnings: &mut Vec<String>) -> Result<Self> {
        let mut bytes = [0u8; ARCHIVE_HEADER_SIZE];
        reader
            .read_exact(&mut bytes)
            .map_err(|error| ParzError::from_read(error, "archive header"))?;
        Self::from_bytes(bytes, warnings)
    }

    pub fn to_bytes(&self) -> [u8; ARCHIVE_HEADER_SIZE] {
        let payload_len = FORMAT_VERSION.len() + 4;
        let mut bytes = [0u8; ARCHIVE_HEADER_SIZE];
        bytes[..8].copy_from_slice(&FORMAT_VERSION);
        bytes[8..12].copy_from_slice(&self.block_size.to_le_bytes());
        let crc = crc32fast::hash(&bytes[..payload_len]);
        encode_trailer(&mut bytes[payload_len..], crc);
        bytes
    }

    fn from_bytes(bytes: [u8; ARCHIVE_HEADER_SIZE], warnings: &mut Vec<String>) -> Result<Self> {
        if bytes[..8] != FORMAT_VERSION {
            return Err(ParzError::UnsupportedVersion {
                found: String::from_utf8_lossy(&bytes[..8]).into_owned(),
            });
        }

        let payload_len = FORMAT_VERSION.len() + 4;
        let crc = crc32fast::hash(&bytes[..payload_len]);
        check_trailer(&bytes[payload_len..], "archive header", crc, warnings)?;

        let block_size = i32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if block_size <= 0 {
            return Err(ParzError::InvalidFormat("archive block size must be positive"));
        }

        Ok(Self {
            block_size: block_size as u32,
        })
    }
}

/// Per-object header: inside path and original size.
///
/// On disk the record is preceded by a separator; the header offset of an
/// object points just past that separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub inside_path: String,
    pub original_size: u64,
}

impl ObjectHeader {
    pub fn new(inside_path: impl Into<String>, original_size: u64) -> Self {
        Self {
            inside_path: inside_path.into(),
            original_size,
        }
    }

    /// Encodes the record that follows the leading separator.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let path = encode_utf16(&self.inside_path);
        if path.len() > MAX_INSIDE_PATH_BYTES {
            return Err(ParzError::validation(format!(
                "inside path \"{}\" is too long",
                self.inside_path
            )));
        }
        let original_size = i64::try_from(self.original_size)
            .map_err(|_| ParzError::InvalidFormat("original size exceeds i64 range"))?;

        let mut out = Vec::with_capacity(4 + path.len() + 8 + RECORD_TRAILER_SIZE);
        out.extend_from_slice(&(path.len() as i32).to_le_bytes());
        out.extend_from_slice(&path);
        out.extend_from_slice(&original_size.to_le_bytes());
        let crc = crc32fast::hash(&out);
        let payload_len = out.len();
        out.resize(payload_len + RECORD_TRAILER_SIZE, 0);
        encode_trailer(&mut out[payload_len..], crc);
        Ok(out)
    }

    /// Reads a header record positioned at its header offset.
    ///
    /// Returns the header and the encoded record length; the object's block
    /// stream starts right after the record.
    pub fn read<R: Read>(reader: &mut R, warnings: &mut Vec<String>) -> Result<(Self, u64)> {
        let mut hasher = Hasher::new();

        let mut len_bytes = [0u8; 4];
        reader
            .read_exact(&mut len_bytes)
            .map_err(|error| ParzError::from_read(error, "object header"))?;
        hasher.update(&len_bytes);
        let path_len = i32::from_le_bytes(len_bytes);
        if path_len < 0 || path_len as usize > MAX_INSIDE_PATH_BYTES {
            return Err(ParzError::InvalidFormat("object header path length out of range"));
        }
        if path_len % 2 != 0 {
            return Err(ParzError::InvalidFormat("object header path is not UTF-16"));
        }

        let mut path = vec![0u8; path_len as usize];
        reader
            .read_exact(&mut path)
            .map_err(|error| ParzError::from_read(error, "object header"))?;
        hasher.update(&path);

        let mut size_bytes = [0u8; 8];
        reader
            .read_exact(&mut size_bytes)
            .map_err(|error| ParzError::from_read(error, "object header"))?;
        hasher.update(&size_bytes);

        let mut trailer = [0u8; RECORD_TRAILER_SIZE];
        reader
            .read_exact(&mut trailer)
            .map_err(|error| ParzError::from_read(error, "object header"))?;
        check_trailer(&trailer, "object header", hasher.finalize(), warnings)?;

        let original_size = i64::from_le_bytes(size_bytes);
        if original_size < 0 {
            return Err(ParzError::InvalidFormat("object original size is negative"));
        }

        let header = Self {
            inside_path: decode_utf16(&path)?,
            original_size: original_size as u64,
        };
        let record_len = (4 + path.len() + 8 + RECORD_TRAILER_SIZE) as u64;
        Ok((header, record_len))
    }
}

/// Writes `separator | crc | separator` into a 12-byte slot.
pub(crate) fn encode_trailer(slot: &mut [u8], crc: u32) {
    slot[..4].copy_from_slice(&RECORD_SEPARATOR);
    slot[4..8].copy_from_slice(&crc.to_le_bytes());
    slot[8..12].copy_from_slice(&RECORD_SEPARATOR);
}

/// Validates a record trailer against the checksum of the record payload.
///
/// Separator mismatches are reported as warnings; a checksum mismatch is fatal.
pub(crate) fn check_trailer(
    trailer: &[u8],
    record: &'static str,
    actual_crc: u32,
    warnings: &mut Vec<String>,
) -> Result<()> {
    check_separator(&trailer[..4], record, warnings);
    let expected = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
    if expected != actual_crc {
        telemetry::count(Counter::ChecksumFailures, 1);
        tracing::warn!(
            target: tags::TARGET_FORMAT,
            record,
            expected,
            actual = actual_crc,
            "record checksum mismatch"
        );
        return Err(ParzError::ChecksumMismatch {
            record,
            expected,
            actual: actual_crc,
        });
    }
    check_separator(&trailer[8..12], record, warnings);
    telemetry::count(Counter::RecordsValidated, 1);
    Ok(())
}

pub(crate) fn check_separator(bytes: &[u8], record: &'static str, warnings: &mut Vec<String>) {
    if bytes != RECORD_SEPARATOR {
        tracing::warn!(target: tags::TARGET_FORMAT, record, "record separator mismatch");
        warnings.push(format!("{record} separator mismatch; archive may be damaged"));
    }
}

fn encode_utf16(value: &str) -> Vec<u8> {
    value.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn decode_utf16(bytes: &[u8]) -> Result<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| ParzError::InvalidFormat("object path is not valid UTF-16"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn archive_header_layout() {
        let bytes = ArchiveHeader::new(65536).to_bytes();
        assert_eq!(&bytes[..8], b"PARZv1.1");
        assert_eq!(&bytes[8..12], &65536i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &RECORD_SEPARATOR);
        assert_eq!(&bytes[16..20], &crc32fast::hash(&bytes[..12]).to_le_bytes());
        assert_eq!(&bytes[20..24], &RECORD_SEPARATOR);

        let mut warnings = Vec::new();
        let decoded = ArchiveHeader::read(&mut Cursor::new(bytes), &mut warnings).expect("decode");
        assert_eq!(decoded.block_size, 65536);
        assert!(warnings.is_empty());
    }

    #[test]
    fn object_header_uses_utf16_path() {
        let header = ObjectHeader::new("dir/ä.txt", 42);
        let encoded = header.encode().expect("encode");
        let path_len = "dir/ä.txt".encode_utf16().count() * 2;
        assert_eq!(&encoded[..4], &(path_len as i32).to_le_bytes());
        assert_eq!(encoded.len(), 4 + path_len + 8 + RECORD_TRAILER_SIZE);

        let mut warnings = Vec::new();
        let (decoded, record_len) =
            ObjectHeader::read(&mut Cursor::new(&encoded), &mut warnings).expect("decode");
        assert_eq!(decoded, header);
        assert_eq!(record_len, encoded.len() as u64);
    }

    #[test]
    fn separator_damage_is_only_a_warning() {
        let mut bytes = ArchiveHeader::new(1024).to_bytes();
        bytes[ARCHIVE_HEADER_SIZE - 1] ^= 0x55;
        let mut warnings = Vec::new();
        let decoded = ArchiveHeader::read(&mut Cursor::new(bytes), &mut warnings).expect("decode");
        assert_eq!(decoded.block_size, 1024);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn version_and_checksum_are_enforced() {
        let mut wrong_version = ArchiveHeader::new(1024).to_bytes();
        wrong_version[0] = b'X';
        assert!(matches!(
            ArchiveHeader::read(&mut Cursor::new(wrong_version), &mut Vec::new()),
            Err(ParzError::UnsupportedVersion { .. })
        ));

        let mut wrong_size = ArchiveHeader::new(1024).to_bytes();
        wrong_size[9] ^= 0x01;
        assert!(matches!(
            ArchiveHeader::read(&mut Cursor::new(wrong_size), &mut Vec::new()),
            Err(ParzError::ChecksumMismatch { .. })
        ));

        assert!(matches!(
            ArchiveHeader::read(&mut Cursor::new(&[0u8; 10][..]), &mut Vec::new()),
            Err(ParzError::Truncated { .. })
        ));
    }
}
