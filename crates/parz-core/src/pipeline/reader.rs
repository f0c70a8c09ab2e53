use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::core::{AbortFlag, BlockPlan, BlockSender, PlanSignal};
use crate::format::BlockStreamReader;
use crate::telemetry::{self, Counter, IoKind, IoScope, WorkloadMonitor, tags};
use crate::types::{DataBlock, Mode};
use crate::{ParzError, Result};

use super::TaskSpec;

/// Producer side of a task, resolved once from the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSource {
    /// Chunks a file from disk into `block_size` blocks.
    OriginalFile {
        path: PathBuf,
        expected_size: u64,
        block_size: u32,
    },
    /// Parses an object's block stream out of an archive.
    CompressedBlocks {
        archive_path: PathBuf,
        data_offset: u64,
        block_size: u32,
        original_size: u64,
    },
}

impl BlockSource {
    pub fn for_task(spec: &TaskSpec) -> Result<Self> {
        match spec.mode {
            Mode::Compress | Mode::Append => Ok(Self::OriginalFile {
                path: spec.object.original_path.clone(),
                expected_size: spec.object.original_size,
                block_size: spec.block_size,
            }),
            Mode::Decompress => Ok(Self::CompressedBlocks {
                archive_path: spec.archive_path.clone(),
                data_offset: spec.object.data_offset,
                block_size: spec.block_size,
                original_size: spec.object.original_size,
            }),
            Mode::Browse => Err(ParzError::validation("browse mode has no block source")),
        }
    }

    /// Streams every block into `queue`, publishing the plan first.
    ///
    /// The sender is consumed, so the queue is closed on return whatever the
    /// outcome.
    pub fn run(
        &self,
        queue: BlockSender<DataBlock>,
        plan: &PlanSignal,
        workload: &dyn WorkloadMonitor,
        abort: &AbortFlag,
    ) -> Result<u64> {
        match self {
            Self::OriginalFile {
                path,
                expected_size,
                block_size,
            } => read_original(path, *expected_size, *block_size, &queue, plan, workload, abort),
            Self::CompressedBlocks {
                archive_path,
                data_offset,
                block_size,
                original_size,
            } => read_compressed(
                archive_path,
                *data_offset,
                *block_size,
                *original_size,
                &queue,
                plan,
                workload,
                abort,
            ),
        }
    }
}

fn read_original(
    path: &Path,
    expected_size: u64,
    block_size: u32,
    queue: &BlockSender<DataBlock>,
    plan: &PlanSignal,
    workload: &dyn WorkloadMonitor,
    abort: &AbortFlag,
) -> Result<u64> {
    let mut file = File::open(path)
        .map_err(|error| ParzError::from(error).with_context(format!("open {}", path.display())))?;
    let len = file.metadata()?.len();
    if len != expected_size {
        return Err(ParzError::validation(format!(
            "File \"{}\" changed since it was scanned ({expected_size} -> {len} bytes).",
            path.display()
        )));
    }

    let block_plan = BlockPlan::for_source(len, block_size);
    plan.publish(block_plan)?;
    tracing::debug!(
        target: tags::TARGET_READER,
        path = %path.display(),
        blocks = block_plan.block_count,
        "reading original file"
    );

    let last_size = block_plan.last_block_size.unwrap_or(block_size);
    for seq in 0..block_plan.block_count {
        abort.check()?;
        let size = if seq + 1 == block_plan.block_count {
            last_size
        } else {
            block_size
        };

        let mut payload = vec![0u8; size as usize];
        {
            let _io = IoScope::enter(workload, IoKind::Read);
            file.read_exact(&mut payload)
                .map_err(|error| ParzError::from_read(error, "original file"))?;
        }
        record_read(size as u64);
        queue.push(DataBlock::new(seq, payload)?)?;
    }

    Ok(block_plan.block_count)
}

#[allow(clippy::too_many_arguments)]
fn read_compressed(
    archive_path: &Path,
    data_offset: u64,
    block_size: u32,
    original_size: u64,
    queue: &BlockSender<DataBlock>,
    plan: &PlanSignal,
    workload: &dyn WorkloadMonitor,
    abort: &AbortFlag,
) -> Result<u64> {
    let mut file = File::open(archive_path).map_err(|error| {
        ParzError::from(error).with_context(format!("open {}", archive_path.display()))
    })?;
    file.seek(SeekFrom::Start(data_offset))?;

    let mut stream = {
        let _io = IoScope::enter(workload, IoKind::Read);
        BlockStreamReader::begin(BufReader::new(file), block_size, original_size)?
    };
    let block_count = stream.block_count();
    plan.publish(BlockPlan {
        block_count,
        last_block_size: None,
    })?;

    let mut seq = 0u64;
    loop {
        abort.check()?;
        let next = {
            let _io = IoScope::enter(workload, IoKind::Read);
            stream.next_block()?
        };
        let Some((payload, original_len)) = next else {
            break;
        };
        record_read(payload.len() as u64);
        queue.push(DataBlock::with_logical_size(seq, original_len, payload))?;
        seq += 1;
    }

    Ok(block_count)
}

fn record_read(bytes: u64) {
    telemetry::count(Counter::ReaderBlocks, 1);
    telemetry::count(Counter::ReaderBytes, bytes);
}
