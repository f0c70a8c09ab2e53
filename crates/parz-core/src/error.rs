use thiserror::Error;

/// Broad classification of a [`ParzError`], looking through context wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments, archive existence mismatches, block size mismatches.
    Validation,
    /// Damaged or unsupported archive bytes.
    Format,
    /// Operating system read/write/seek failures.
    Io,
    /// Block codec failures.
    Codec,
    /// The run was canceled on request.
    Cancelled,
    Other,
}

#[derive(Debug, Error)]
pub enum ParzError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Validation(String),
    #[error("block size in existing archive {archive} is different from requested block size {requested}")]
    BlockSizeMismatch { archive: u32, requested: u32 },
    #[error("unsupported archive version {found:?}")]
    UnsupportedVersion { found: String },
    #[error(
        "{record} checksum mismatch (expected {expected:#010x}, actual {actual:#010x}): archive format unsupported or file damaged"
    )]
    ChecksumMismatch {
        record: &'static str,
        expected: u32,
        actual: u32,
    },
    #[error("truncated {record}: archive format unsupported or file damaged")]
    Truncated { record: &'static str },
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("invalid block id (expected {expected}, actual {actual})")]
    InvalidBlockId { expected: u64, actual: u64 },
    #[error("compression error: {0}")]
    CompressionError(String),
    #[error("decompression error: {0}")]
    DecompressionError(String),
    #[error("operation canceled")]
    Cancelled,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ParzError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ParzError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Maps an early end of stream to [`ParzError::Truncated`] for `record`.
    pub(crate) fn from_read(error: std::io::Error, record: &'static str) -> Self {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated { record }
        } else {
            Self::Io(error)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Validation(_) | Self::BlockSizeMismatch { .. } => ErrorKind::Validation,
            Self::UnsupportedVersion { .. }
            | Self::ChecksumMismatch { .. }
            | Self::Truncated { .. }
            | Self::InvalidFormat(_)
            | Self::InvalidBlockId { .. } => ErrorKind::Format,
            Self::CompressionError(_) | Self::DecompressionError(_) => ErrorKind::Codec,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Context { source, .. } => source.kind(),
            Self::Other(_) => ErrorKind::Other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}
