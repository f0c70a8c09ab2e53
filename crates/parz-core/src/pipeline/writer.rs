use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::core::{AbortFlag, PlanSignal, ReorderQueue};
use crate::format::BlockStreamWriter;
use crate::telemetry::{self, Counter, Event, EventSink, IoKind, IoScope, WorkloadMonitor, tags};
use crate::types::{DataBlock, Mode};
use crate::{ParzError, Result};

use super::TaskSpec;

const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Consumer side of a task, resolved once from the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Frames compressed blocks at the end of the archive.
    ArchiveStream {
        archive_path: PathBuf,
        data_offset: u64,
    },
    /// Writes raw restored bytes into a fresh file.
    RestoredFile {
        target_path: PathBuf,
        expected_size: u64,
    },
}

/// What the writer stage produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOutput {
    /// Archive offset of the block stream; zero for restored files.
    pub start_offset: u64,
    pub bytes_written: u64,
    pub blocks_written: u64,
}

impl OutputTarget {
    pub fn for_task(spec: &TaskSpec) -> Result<Self> {
        match spec.mode {
            Mode::Compress | Mode::Append => Ok(Self::ArchiveStream {
                archive_path: spec.archive_path.clone(),
                data_offset: spec.object.data_offset,
            }),
            Mode::Decompress => {
                let target_path = spec
                    .restore_path
                    .clone()
                    .ok_or_else(|| ParzError::validation("decompress task has no target path"))?;
                Ok(Self::RestoredFile {
                    target_path,
                    expected_size: spec.object.original_size,
                })
            }
            Mode::Browse => Err(ParzError::validation("browse mode has no output target")),
        }
    }

    /// Drains `queue` in sequence order until end of stream.
    pub fn run(
        &self,
        queue: &ReorderQueue<DataBlock>,
        plan: &PlanSignal,
        events: &dyn EventSink,
        workload: &dyn WorkloadMonitor,
        abort: &AbortFlag,
    ) -> Result<WriterOutput> {
        let progress = Progress {
            events,
            workload,
            abort,
        };
        match self {
            Self::ArchiveStream {
                archive_path,
                data_offset,
            } => write_archive_stream(archive_path, *data_offset, queue, plan, &progress),
            Self::RestoredFile {
                target_path,
                expected_size,
            } => write_restored(target_path, *expected_size, queue, plan, &progress),
        }
    }
}

struct Progress<'a> {
    events: &'a dyn EventSink,
    workload: &'a dyn WorkloadMonitor,
    abort: &'a AbortFlag,
}

impl Progress<'_> {
    fn report(&self, completed: u64, total: u64) {
        if self.abort.is_raised() {
            return;
        }
        self.events.emit(Event::Progress {
            percent_hundredths: percent_hundredths(completed, total),
            workload: self.workload.sample(),
        });
    }
}

/// Completion in hundredths of a percent; an empty plan is complete.
pub(crate) fn percent_hundredths(completed: u64, total: u64) -> u32 {
    if total == 0 {
        return 10_000;
    }
    ((u128::from(completed.min(total)) * 10_000) / u128::from(total)) as u32
}

fn write_archive_stream(
    archive_path: &Path,
    data_offset: u64,
    queue: &ReorderQueue<DataBlock>,
    plan: &PlanSignal,
    progress: &Progress<'_>,
) -> Result<WriterOutput> {
    let block_plan = plan.wait()?;
    let mut file = OpenOptions::new()
        .write(true)
        .open(archive_path)
        .map_err(|error| {
            ParzError::from(error).with_context(format!("open {}", archive_path.display()))
        })?;
    let start_offset = file.seek(SeekFrom::End(0))?;
    if start_offset != data_offset {
        return Err(ParzError::InvalidFormat(
            "archive does not end at the object's data offset",
        ));
    }

    let mut stream = BlockStreamWriter::begin(
        BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
        block_plan.block_count,
    )?;
    if block_plan.block_count == 0 {
        progress.report(0, 0);
    }

    while let Some(block) = queue.pop()? {
        {
            let _io = IoScope::enter(progress.workload, IoKind::Write);
            stream.write_block(block.payload())?;
        }
        record_written(block.len() as u64);
        progress.report(stream.blocks_written(), block_plan.block_count);
    }

    if stream.blocks_written() != block_plan.block_count {
        return Err(ParzError::InvalidBlockId {
            expected: block_plan.block_count,
            actual: stream.blocks_written(),
        });
    }
    let last_block_size = block_plan
        .last_block_size
        .ok_or(ParzError::InvalidFormat("last block size unknown"))?;
    let blocks_written = stream.blocks_written();
    let (writer, bytes_written) = {
        let _io = IoScope::enter(progress.workload, IoKind::Write);
        stream.finish(last_block_size)?
    };
    let file: File = writer
        .into_inner()
        .map_err(|error| ParzError::Io(error.into_error()))?;
    file.sync_data()?;

    tracing::debug!(
        target: tags::TARGET_WRITER,
        start_offset,
        bytes_written,
        blocks_written,
        "block stream written"
    );
    Ok(WriterOutput {
        start_offset,
        bytes_written,
        blocks_written,
    })
}

fn write_restored(
    target_path: &Path,
    expected_size: u64,
    queue: &ReorderQueue<DataBlock>,
    plan: &PlanSignal,
    progress: &Progress<'_>,
) -> Result<WriterOutput> {
    let block_plan = plan.wait()?;
    let file = File::create(target_path).map_err(|error| {
        ParzError::from(error).with_context(format!("create {}", target_path.display()))
    })?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    if block_plan.block_count == 0 {
        progress.report(0, 0);
    }

    let mut bytes_written = 0u64;
    let mut blocks_written = 0u64;
    while let Some(block) = queue.pop()? {
        {
            let _io = IoScope::enter(progress.workload, IoKind::Write);
            writer.write_all(block.payload())?;
        }
        bytes_written += block.len() as u64;
        blocks_written += 1;
        record_written(block.len() as u64);
        progress.report(blocks_written, block_plan.block_count);
    }

    {
        let _io = IoScope::enter(progress.workload, IoKind::Write);
        writer.flush()?;
    }
    if bytes_written != expected_size {
        return Err(ParzError::DecompressionError(format!(
            "restored {bytes_written} bytes, expected {expected_size}"
        )));
    }

    tracing::debug!(
        target: tags::TARGET_WRITER,
        path = %target_path.display(),
        bytes_written,
        "object restored"
    );
    Ok(WriterOutput {
        start_offset: 0,
        bytes_written,
        blocks_written,
    })
}

fn record_written(bytes: u64) {
    telemetry::count(Counter::WriterBlocks, 1);
    telemetry::count(Counter::WriterBytes, bytes);
}
