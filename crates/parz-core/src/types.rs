use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParzError;

pub type Result<T> = std::result::Result<T, ParzError>;

/// Block size used when a compression request does not name one (4 MiB).
pub const DEFAULT_BLOCK_SIZE: u32 = 4 * 1024 * 1024;

/// Queue capacity per worker thread for both pipeline queues.
pub const QUEUE_CAPACITY_FACTOR: usize = 3;

/// Processing mode of an archive run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Compress,
    Append,
    Decompress,
    Browse,
}

impl Mode {
    /// Returns true for modes that write block streams into the archive.
    pub fn writes_archive(self) -> bool {
        matches!(self, Self::Compress | Self::Append)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Append => "append",
            Self::Decompress => "decompress",
            Self::Browse => "browse",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable unit of pipeline work.
///
/// `logical_size` is the size the block represents at its current stage: the
/// original length for raw and archived blocks, the compressed length once a
/// compress transform has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    seq: u64,
    logical_size: u32,
    payload: Vec<u8>,
}

impl DataBlock {
    /// Creates a block whose logical size is the payload length.
    ///
    /// # Errors
    /// Returns an error if the payload does not fit the 31-bit size field of
    /// the block framing.
    pub fn new(seq: u64, payload: Vec<u8>) -> crate::Result<Self> {
        let logical_size = frame_len(payload.len())?;
        Ok(Self {
            seq,
            logical_size,
            payload,
        })
    }

    /// Creates a block carrying an explicit logical size, used for archived
    /// blocks whose payload is still compressed.
    pub fn with_logical_size(seq: u64, logical_size: u32, payload: Vec<u8>) -> Self {
        Self {
            seq,
            logical_size,
            payload,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn logical_size(&self) -> u32 {
        self.logical_size
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Converts a buffer length into the signed 32-bit length used by the framing.
pub(crate) fn frame_len(len: usize) -> crate::Result<u32> {
    i32::try_from(len)
        .map(|len| len as u32)
        .map_err(|_| ParzError::InvalidFormat("block length exceeds i32 range"))
}
