//! Multi-object runs: compress, append, decompress and browse.
//!
//! Objects are processed strictly one after another, each by its own
//! [`TaskOrchestrator`].

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use crate::format::{self, ArchiveMetadata, ArchiveWriter, ObjectInArchive};
use crate::pipeline::{CancelHandle, PipelineOptions, TaskOrchestrator, TaskSpec};
use crate::report::{ProcessingResult, ResultType, StageKind, TaskResult, WorkerResult};
use crate::telemetry::{Event, EventSink, WorkloadMonitor, tags};
use crate::types::Mode;
use crate::{ParzError, Result};

pub mod objects;
pub mod selection;
pub mod spec;

pub use objects::{collect_objects, normalize_inside_path};
pub use selection::DecompressSelection;
pub use spec::{BrowseSpec, CompressionSpec, DecompressionSpec, ProcessingSpec};

/// Drives whole archive runs and reports through an explicit event sink.
pub struct Archiver {
    events: Arc<dyn EventSink>,
    workload: Arc<dyn WorkloadMonitor>,
    cancel: CancelHandle,
}

impl Archiver {
    pub fn new(events: Arc<dyn EventSink>, workload: Arc<dyn WorkloadMonitor>) -> Self {
        Self {
            events,
            workload,
            cancel: CancelHandle::new(),
        }
    }

    /// Handle that cancels the current run: its running task and every
    /// object after it. A request made between runs applies to the next one.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn compress(&self, spec: CompressionSpec) -> ProcessingResult {
        self.run(ProcessingSpec::Compress(spec))
    }

    pub fn append(&self, spec: CompressionSpec) -> ProcessingResult {
        self.run(ProcessingSpec::Append(spec))
    }

    pub fn decompress(&self, spec: DecompressionSpec) -> ProcessingResult {
        self.run(ProcessingSpec::Decompress(spec))
    }

    pub fn browse(&self, spec: BrowseSpec) -> ProcessingResult {
        self.run(ProcessingSpec::Browse(spec))
    }

    /// Runs a request to completion.
    ///
    /// Errors that stop the whole run are emitted as [`Event::Error`] and
    /// yield a `Failed` result. A cancel request is consumed by the run it
    /// stops.
    pub fn run(&self, spec: ProcessingSpec) -> ProcessingResult {
        let mode = spec.mode();
        tracing::info!(
            target: tags::TARGET_ARCHIVER,
            %mode,
            archive = %spec.archive_path().display(),
            "archive run started"
        );

        let outcome = validate(&spec).and_then(|()| match spec {
            ProcessingSpec::Compress(spec) => self.run_compress(spec),
            ProcessingSpec::Append(spec) => self.run_append(spec),
            ProcessingSpec::Decompress(spec) => self.run_decompress(spec),
            ProcessingSpec::Browse(spec) => self.run_browse(spec),
        });

        self.cancel.reset();
        match outcome {
            Ok(result) => {
                tracing::info!(
                    target: tags::TARGET_ARCHIVER,
                    %mode,
                    result = %result.result,
                    tasks = result.tasks.len(),
                    "archive run finished"
                );
                result
            }
            Err(error) => {
                tracing::error!(target: tags::TARGET_ARCHIVER, %mode, %error, "archive run failed");
                self.events.emit(Event::Error(error.to_string()));
                ProcessingResult::failed(mode)
            }
        }
    }

    fn message(&self, text: String) {
        self.events.emit(Event::Message(text));
    }

    fn warn(&self, result: &mut ProcessingResult, text: String) {
        tracing::warn!(target: tags::TARGET_ARCHIVER, "{text}");
        self.events.emit(Event::Warning(text.clone()));
        result.add_warning(text);
    }

    fn run_compress(&self, spec: CompressionSpec) -> Result<ProcessingResult> {
        let mut result = ProcessingResult::new(Mode::Compress);
        let objects = self.skip_duplicates(spec.objects.clone(), None, &mut result);
        if objects.is_empty() {
            return Err(ParzError::validation("No files to compress."));
        }

        let options = PipelineOptions::new(spec.thread_count, spec.block_size_or_default());
        options.validate()?;
        self.message(files_message(objects.len(), "compress"));

        let mut writer = ArchiveWriter::create(&spec.archive_path, options.block_size)?;
        self.compress_objects(&mut writer, Mode::Compress, objects, options, &mut result)?;
        if !self.cancel.is_canceled() {
            writer.write_tail()?;
        }
        Ok(result)
    }

    fn run_append(&self, spec: CompressionSpec) -> Result<ProcessingResult> {
        let mut result = ProcessingResult::new(Mode::Append);
        let metadata = format::browse(&spec.archive_path)?;
        self.surface_warnings(&metadata, &mut result);

        if let Some(requested) = spec.block_size {
            if requested != metadata.block_size {
                return Err(ParzError::BlockSizeMismatch {
                    archive: metadata.block_size,
                    requested,
                });
            }
        }
        let options = PipelineOptions::new(spec.thread_count, metadata.block_size);
        options.validate()?;

        let objects = self.skip_duplicates(spec.objects.clone(), Some(&metadata), &mut result);
        self.message(files_message(objects.len(), "compress"));
        if objects.is_empty() {
            return Ok(result);
        }

        let mut writer = ArchiveWriter::append(&spec.archive_path, &metadata)?;
        self.compress_objects(&mut writer, Mode::Append, objects, options, &mut result)?;
        if !self.cancel.is_canceled() {
            writer.write_tail()?;
        }
        Ok(result)
    }

    fn run_decompress(&self, spec: DecompressionSpec) -> Result<ProcessingResult> {
        let mut result = ProcessingResult::new(Mode::Decompress);
        let metadata = format::browse(&spec.archive_path)?;
        self.surface_warnings(&metadata, &mut result);

        let options = PipelineOptions::new(spec.thread_count, metadata.block_size);
        options.validate()?;
        let targets = DecompressSelection::from_request(&spec.target_path, &spec.inside_paths)?
            .resolve(&metadata, &spec.target_path)?;
        self.message(files_message(targets.len(), "decompress"));

        for (object, output) in targets {
            self.message(format!(
                "Decompressing {} ({} bytes) to {}",
                object.inside_path,
                object.original_size,
                output.display()
            ));

            let task = match output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                Some(parent) => fs::create_dir_all(parent).map_err(|error| {
                    ParzError::from(error).with_context(format!("create {}", parent.display()))
                }),
                None => Ok(()),
            }
            .map(|()| {
                let task_spec =
                    TaskSpec::decompress(&spec.archive_path, object.clone(), &output, options);
                self.run_task(task_spec)
            })
            .unwrap_or_else(|error| self.failed_task(Mode::Decompress, &object, error));

            if self.record_task(&mut result, task) {
                break;
            }
        }
        Ok(result)
    }

    fn run_browse(&self, spec: BrowseSpec) -> Result<ProcessingResult> {
        let mut result = ProcessingResult::new(Mode::Browse);
        let metadata = format::browse(&spec.archive_path)?;
        self.surface_warnings(&metadata, &mut result);
        self.message(format!(
            "Archive holds {} file(s), block size {} bytes.",
            metadata.len(),
            metadata.block_size
        ));
        result.escalate(ResultType::Success);
        result.archive = Some(metadata);
        Ok(result)
    }

    /// Writes each object header, runs its task and records the tail entry of
    /// every object that finished. Stops after a cancel.
    fn compress_objects(
        &self,
        writer: &mut ArchiveWriter,
        mode: Mode,
        objects: Vec<ObjectInArchive>,
        options: PipelineOptions,
        result: &mut ProcessingResult,
    ) -> Result<()> {
        for mut object in objects {
            self.message(format!(
                "Compressing {} ({} bytes)",
                object.original_path.display(),
                object.original_size
            ));

            let placement = writer.begin_object(&object.inside_path, object.original_size)?;
            object.header_offset = placement.header_offset;
            object.data_offset = placement.data_offset;

            let task = self.run_task(TaskSpec::compress(
                mode,
                writer.path().to_path_buf(),
                object,
                options,
            ));
            if task.result.is_success() {
                writer.finish_object(task.compressed_size)?;
            } else {
                writer.discard_object();
            }

            if self.record_task(result, task) {
                break;
            }
        }
        Ok(())
    }

    fn run_task(&self, spec: TaskSpec) -> TaskResult {
        TaskOrchestrator::with_cancel(
            spec,
            Arc::clone(&self.events),
            Arc::clone(&self.workload),
            self.cancel.clone(),
        )
        .run()
    }

    /// Adds a task result; returns true when the run must stop.
    fn record_task(&self, result: &mut ProcessingResult, task: TaskResult) -> bool {
        if task.result != ResultType::Success {
            self.events.emit(Event::TaskResult(Box::new(task.clone())));
        }
        result.add_task(task);

        if self.cancel.is_canceled() {
            result.escalate(ResultType::Failed);
            tracing::info!(target: tags::TARGET_ARCHIVER, "run canceled; remaining objects skipped");
            return true;
        }
        false
    }

    fn failed_task(&self, mode: Mode, object: &ObjectInArchive, error: ParzError) -> TaskResult {
        self.events.emit(Event::Error(error.to_string()));
        let mut task = TaskResult::new(mode, &object.inside_path, object.original_size);
        let mut stage = WorkerResult::new(StageKind::Writer);
        stage.add_error(error.to_string());
        task.add_stage(stage);
        task
    }

    /// Drops objects whose inside path is already archived or already queued.
    fn skip_duplicates(
        &self,
        objects: Vec<ObjectInArchive>,
        existing: Option<&ArchiveMetadata>,
        result: &mut ProcessingResult,
    ) -> Vec<ObjectInArchive> {
        let mut queued = HashSet::new();
        let mut kept = Vec::with_capacity(objects.len());
        for object in objects {
            let archived = existing.is_some_and(|metadata| metadata.contains(&object.inside_path));
            if archived || !queued.insert(object.inside_path.clone()) {
                self.warn(
                    result,
                    format!(
                        "File \"{}\" already exists in archive. Will be skipped.",
                        object.inside_path
                    ),
                );
                continue;
            }
            kept.push(object);
        }
        kept
    }

    fn surface_warnings(&self, metadata: &ArchiveMetadata, result: &mut ProcessingResult) {
        for warning in &metadata.warnings {
            self.warn(result, warning.clone());
        }
    }
}

fn validate(spec: &ProcessingSpec) -> Result<()> {
    let path = spec.archive_path();
    match spec {
        ProcessingSpec::Compress(_) if path.exists() => Err(ParzError::validation(format!(
            "File \"{}\" already exists.",
            path.display()
        ))),
        ProcessingSpec::Compress(_) => Ok(()),
        _ if !path.is_file() => Err(ParzError::validation(format!(
            "File \"{}\" not found.",
            path.display()
        ))),
        _ => Ok(()),
    }
}

fn files_message(count: usize, verb: &str) -> String {
    let noun = if count == 1 { "file" } else { "files" };
    format!("Got {count} {noun} to {verb}.")
}
