use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::format::ObjectInArchive;
use crate::types::{DEFAULT_BLOCK_SIZE, Mode, QUEUE_CAPACITY_FACTOR};
use crate::{ParzError, Result};

/// Thread count and block size shared by every task of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Worker threads per object; defaults to the logical core count.
    pub thread_count: usize,
    pub block_size: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            thread_count: num_cpus::get().max(1),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl PipelineOptions {
    pub fn new(thread_count: usize, block_size: u32) -> Self {
        Self {
            thread_count,
            block_size,
        }
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(ParzError::validation("thread count must be at least 1"));
        }
        if self.block_size == 0 || self.block_size > i32::MAX as u32 {
            return Err(ParzError::validation(format!(
                "block size must be between 1 and {} bytes",
                i32::MAX
            )));
        }
        Ok(())
    }

    /// Capacity of both pipeline queues.
    pub fn queue_capacity(&self) -> usize {
        self.thread_count.max(1) * QUEUE_CAPACITY_FACTOR
    }
}

/// Everything one [`TaskOrchestrator`](super::TaskOrchestrator) needs to process one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub mode: Mode,
    pub archive_path: PathBuf,
    /// For archive-writing modes the offsets must already come from the
    /// written object header.
    pub object: ObjectInArchive,
    pub thread_count: usize,
    pub block_size: u32,
    /// Destination of the restored bytes; decompress only.
    pub restore_path: Option<PathBuf>,
}

impl TaskSpec {
    /// Task that appends `object`'s block stream to the archive.
    pub fn compress(
        mode: Mode,
        archive_path: impl Into<PathBuf>,
        object: ObjectInArchive,
        options: PipelineOptions,
    ) -> Self {
        Self {
            mode,
            archive_path: archive_path.into(),
            object,
            thread_count: options.thread_count,
            block_size: options.block_size,
            restore_path: None,
        }
    }

    /// Task that restores `object` from the archive into `restore_path`.
    pub fn decompress(
        archive_path: impl Into<PathBuf>,
        object: ObjectInArchive,
        restore_path: impl Into<PathBuf>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            mode: Mode::Decompress,
            archive_path: archive_path.into(),
            object,
            thread_count: options.thread_count,
            block_size: options.block_size,
            restore_path: Some(restore_path.into()),
        }
    }

    pub fn options(&self) -> PipelineOptions {
        PipelineOptions::new(self.thread_count, self.block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_validated() {
        assert!(PipelineOptions::default().validate().is_ok());
        assert!(PipelineOptions::new(0, 1024).validate().is_err());
        assert!(PipelineOptions::new(2, 0).validate().is_err());
        assert!(PipelineOptions::new(2, u32::MAX).validate().is_err());
        assert_eq!(PipelineOptions::new(4, 1024).queue_capacity(), 12);
    }
}
