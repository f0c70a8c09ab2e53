use crate::telemetry::{self, Counter};
use crate::types::{DataBlock, Mode};
use crate::{ParzError, Result};

pub mod deflate;

/// Per-block transform applied by the worker pool, resolved once from the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTransform {
    /// Deflate the payload; the compressed length becomes the logical size.
    Compress,
    /// Inflate the payload back to exactly its recorded original size.
    Decompress,
}

impl BlockTransform {
    /// Resolves the transform for a pipeline mode.
    ///
    /// # Errors
    /// Browse runs no pipeline, so it has no transform.
    pub fn for_mode(mode: Mode) -> Result<Self> {
        match mode {
            Mode::Compress | Mode::Append => Ok(Self::Compress),
            Mode::Decompress => Ok(Self::Decompress),
            Mode::Browse => Err(ParzError::validation(
                "browse mode does not run a block pipeline",
            )),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Decompress => "decompress",
        }
    }

    /// Transforms one block, preserving its sequence number.
    pub fn apply(self, block: DataBlock) -> Result<DataBlock> {
        let seq = block.seq();
        let input_bytes = block.len() as u64;

        let output = match self {
            Self::Compress => DataBlock::new(seq, deflate::compress(block.payload())?)?,
            Self::Decompress => {
                let original_size = block.logical_size();
                let payload = deflate::decompress_exact(block.payload(), original_size as usize)
                    .map_err(|error| error.with_context(format!("block {seq}")))?;
                DataBlock::with_logical_size(seq, original_size, payload)
            }
        };

        telemetry::count(Counter::TransformedBlocks, 1);
        telemetry::count(Counter::TransformInputBytes, input_bytes);
        telemetry::count(Counter::TransformOutputBytes, output.len() as u64);

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_decompress_keeps_sequence_and_size() {
        let payload: Vec<u8> = (0..4096u32).map(|value| (value % 13) as u8).collect();
        let raw = DataBlock::new(7, payload.clone()).expect("block");

        let packed = BlockTransform::Compress.apply(raw).expect("compress");
        assert_eq!(packed.seq(), 7);
        assert_eq!(packed.logical_size() as usize, packed.len());

        let archived = DataBlock::with_logical_size(7, payload.len() as u32, packed.into_payload());
        let restored = BlockTransform::Decompress.apply(archived).expect("decompress");
        assert_eq!(restored.seq(), 7);
        assert_eq!(restored.payload(), payload.as_slice());
    }

    #[test]
    fn browse_has_no_transform() {
        assert!(BlockTransform::for_mode(Mode::Browse).is_err());
        assert_eq!(
            BlockTransform::for_mode(Mode::Append).ok(),
            Some(BlockTransform::Compress)
        );
    }
}
