//! Parallel block compression into a checksummed multi-object archive.
//!
//! Each object flows through one reader, a pool of workers and one ordered
//! writer; [`Archiver`] runs objects one after another and maintains the
//! archive metadata.

pub mod archiver;
pub mod compression;
pub mod core;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod report;
pub mod telemetry;
pub mod types;

pub use archiver::{
    Archiver, BrowseSpec, CompressionSpec, DecompressSelection, DecompressionSpec, ProcessingSpec,
};
pub use compression::BlockTransform;
pub use error::{ErrorKind, ParzError};
pub use format::{ArchiveMetadata, ObjectInArchive};
pub use pipeline::{CancelHandle, PipelineOptions, TaskOrchestrator, TaskSpec};
pub use report::{ProcessingResult, ResultType, StageKind, TaskResult, WorkerResult};
pub use telemetry::{
    ChannelSink, DefaultWorkerTelemetry, Event, EventSink, NoopWorkload, NullSink, SystemWorkload,
    WorkerTelemetry, WorkloadMonitor, WorkloadSample,
};
pub use types::{DEFAULT_BLOCK_SIZE, DataBlock, Mode, Result};
