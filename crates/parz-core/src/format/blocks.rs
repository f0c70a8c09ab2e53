use std::io::{Read, Write};

use crate::types::frame_len;
use crate::{ParzError, Result};

/// Writes one object's block stream:
/// `[i64 count] ([i32 len][bytes])* [i32 last block original size]`.
#[derive(Debug)]
pub struct BlockStreamWriter<W: Write> {
    writer: W,
    expected_blocks: u64,
    blocks_written: u64,
    bytes_written: u64,
}

impl<W: Write> BlockStreamWriter<W> {
    /// Writes the block count and returns a writer for the blocks.
    pub fn begin(mut writer: W, block_count: u64) -> Result<Self> {
        let count = i64::try_from(block_count)
            .map_err(|_| ParzError::InvalidFormat("block count exceeds i64 range"))?;
        writer.write_all(&count.to_le_bytes())?;
        Ok(Self {
            writer,
            expected_blocks: block_count,
            blocks_written: 0,
            bytes_written: 8,
        })
    }

    pub fn write_block(&mut self, payload: &[u8]) -> Result<()> {
        if self.blocks_written >= self.expected_blocks {
            return Err(ParzError::InvalidBlockId {
                expected: self.expected_blocks,
                actual: self.blocks_written,
            });
        }
        let len = frame_len(payload.len())?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.blocks_written += 1;
        self.bytes_written += 4 + payload.len() as u64;
        Ok(())
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Bytes of the stream written so far, count field included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Writes the last block's original size and returns the stream length.
    ///
    /// # Errors
    /// Fails if fewer blocks were written than announced.
    pub fn finish(mut self, last_block_size: u32) -> Result<(W, u64)> {
        if self.blocks_written != self.expected_blocks {
            return Err(ParzError::InvalidBlockId {
                expected: self.expected_blocks,
                actual: self.blocks_written,
            });
        }
        let size = frame_len(last_block_size as usize)?;
        self.writer.write_all(&size.to_le_bytes())?;
        self.writer.flush()?;
        self.bytes_written += 4;
        Ok((self.writer, self.bytes_written))
    }
}

/// Reads one object's block stream back into `(compressed payload, original size)` pairs.
#[derive(Debug)]
pub struct BlockStreamReader<R: Read> {
    reader: R,
    block_count: u64,
    block_size: u32,
    original_size: u64,
    next_index: u64,
}

impl<R: Read> BlockStreamReader<R> {
    /// Reads the block count of a stream positioned at its data offset.
    pub fn begin(mut reader: R, block_size: u32, original_size: u64) -> Result<Self> {
        let mut raw = [0u8; 8];
        reader
            .read_exact(&mut raw)
            .map_err(|error| ParzError::from_read(error, "block stream"))?;
        let block_count = i64::from_le_bytes(raw);
        if block_count < 1 {
            return Err(ParzError::InvalidFormat("block stream must hold at least one block"));
        }
        let block_count = block_count as u64;
        let expected = original_size.div_ceil(u64::from(block_size.max(1))).max(1);
        if block_count != expected {
            return Err(ParzError::InvalidFormat(
                "block count does not match the object size",
            ));
        }

        Ok(Self {
            reader,
            block_count,
            block_size,
            original_size,
            next_index: 0,
        })
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Returns the next compressed payload and the size it must inflate to.
    pub fn next_block(&mut self) -> Result<Option<(Vec<u8>, u32)>> {
        if self.next_index == self.block_count {
            return Ok(None);
        }

        let len = self.read_i32()?;
        if len < 0 {
            return Err(ParzError::InvalidFormat("negative compressed block length"));
        }
        // Untrusted length; the buffer only grows with bytes actually read.
        let len = len as u64;
        let mut payload = Vec::with_capacity(len.min(u64::from(self.block_size)) as usize);
        (&mut self.reader)
            .take(len)
            .read_to_end(&mut payload)
            .map_err(|error| ParzError::from_read(error, "block stream"))?;
        if (payload.len() as u64) < len {
            return Err(ParzError::Truncated {
                record: "block stream",
            });
        }

        self.next_index += 1;
        let original_size = if self.next_index == self.block_count {
            let last = self.read_i32()?;
            if last < 0 || last as u32 > self.block_size {
                return Err(ParzError::InvalidFormat("last block size out of range"));
            }
            let expected = self.original_size - (self.block_count - 1) * u64::from(self.block_size);
            if u64::from(last as u32) != expected {
                return Err(ParzError::InvalidFormat(
                    "last block size does not match the object size",
                ));
            }
            last as u32
        } else {
            self.block_size
        };

        Ok(Some((payload, original_size)))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut raw = [0u8; 4];
        self.reader
            .read_exact(&mut raw)
            .map_err(|error| ParzError::from_read(error, "block stream"))?;
        Ok(i32::from_le_bytes(raw))
    }
}
