/// ASCII version tag at the start of every archive.
pub const FORMAT_VERSION: [u8; 8] = *b"PARZv1.1";
/// Marker written before and after the checksum of every metadata record.
pub const RECORD_SEPARATOR: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Fixed size of the archive header in bytes.
pub const ARCHIVE_HEADER_SIZE: usize = FORMAT_VERSION.len() + 4 + RECORD_TRAILER_SIZE;
/// Separator, CRC32 and separator closing every checksummed record.
pub const RECORD_TRAILER_SIZE: usize = 4 + 4 + 4;
/// Size of one `(header offset, compressed size)` tail entry.
pub const TAIL_ENTRY_SIZE: usize = 8 + 8;
/// Distance from end of file back to the tail-start field.
pub const TAIL_LOCATOR_DISTANCE: u64 = 3 * 4 + 8;
/// Smallest possible tail: separator, empty count, tail start and trailer.
pub const MIN_TAIL_SIZE: u64 = (4 + 4 + 8 + RECORD_TRAILER_SIZE) as u64;

/// Upper bound on the encoded inside-path length accepted when decoding.
pub const MAX_INSIDE_PATH_BYTES: usize = 64 * 1024;
