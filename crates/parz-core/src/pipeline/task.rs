use std::sync::Arc;
use std::thread;
use std::time::{Instant, SystemTime};

use crate::compression::BlockTransform;
use crate::core::{AbortFlag, PlanSignal, ReorderQueue, WorkerPool, block_queue};
use crate::report::{ResultType, StageKind, TaskResult, WorkerResult};
use crate::telemetry::{self, Counter, Event, EventSink, Histogram, WorkloadMonitor, tags};
use crate::types::DataBlock;
use crate::{ParzError, Result};

use super::stage::run_stage;
use super::{BlockSource, CancelHandle, OutputTarget, TaskSpec, WriterOutput};

/// Runs one object through reader, worker pool and writer.
pub struct TaskOrchestrator {
    spec: TaskSpec,
    events: Arc<dyn EventSink>,
    workload: Arc<dyn WorkloadMonitor>,
    cancel: CancelHandle,
}

struct Stages {
    source: BlockSource,
    pool: WorkerPool,
    target: OutputTarget,
}

impl TaskOrchestrator {
    pub fn new(
        spec: TaskSpec,
        events: Arc<dyn EventSink>,
        workload: Arc<dyn WorkloadMonitor>,
    ) -> Self {
        Self::with_cancel(spec, events, workload, CancelHandle::new())
    }

    /// Creates a task that observes an existing cancel handle.
    pub fn with_cancel(
        spec: TaskSpec,
        events: Arc<dyn EventSink>,
        workload: Arc<dyn WorkloadMonitor>,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            spec,
            events,
            workload,
            cancel,
        }
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Requests cancellation; every stage unwinds at its next wait.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn resolve_stages(&self) -> Result<Stages> {
        self.spec.options().validate()?;
        Ok(Stages {
            source: BlockSource::for_task(&self.spec)?,
            pool: WorkerPool::new(
                self.spec.thread_count,
                BlockTransform::for_mode(self.spec.mode)?,
            ),
            target: OutputTarget::for_task(&self.spec)?,
        })
    }

    /// Processes the object and aggregates every stage outcome.
    pub fn run(&self) -> TaskResult {
        let started = Instant::now();
        let object = &self.spec.object;
        let mut result = TaskResult::new(self.spec.mode, &object.inside_path, object.original_size);
        result.started_at = SystemTime::now();
        result.header_offset = object.header_offset;
        result.data_offset = object.data_offset;

        let abort = AbortFlag::new();
        self.cancel.attach(&abort);
        self.workload.begin();

        match self.resolve_stages() {
            Ok(stages) => {
                let output = self.run_stages(&stages, &abort, &mut result);
                if let Some(output) = output {
                    if self.spec.mode.writes_archive() {
                        result.compressed_size = output.bytes_written;
                        result.data_offset = output.start_offset;
                    } else {
                        result.compressed_size = object.compressed_size;
                    }
                }
            }
            Err(error) => {
                let mut stage = WorkerResult::new(StageKind::Reader);
                let error = error.with_context(format!("prepare \"{}\"", object.inside_path));
                self.events.emit(Event::Error(error.to_string()));
                stage.add_error(error.to_string());
                result.add_stage(stage);
            }
        }

        self.workload.end();
        self.cancel.detach();
        result.workload = self.workload.sample();
        if self.cancel.is_canceled() && stopped_early(&result.stages) {
            result.mark_canceled();
            telemetry::count(Counter::CanceledTasks, 1);
        }
        result.duration = started.elapsed();

        telemetry::count(Counter::Tasks, 1);
        telemetry::observe(
            Histogram::TaskLatencyUs,
            telemetry::duration_to_us(result.duration),
        );
        tracing::info!(
            target: tags::TARGET_TASK,
            mode = %self.spec.mode,
            inside_path = %result.inside_path,
            result = %result.result,
            canceled = result.is_canceled,
            original_size = result.original_size,
            compressed_size = result.compressed_size,
            elapsed_ms = result.duration.as_millis() as u64,
            "task finished"
        );
        result
    }

    fn run_stages(
        &self,
        stages: &Stages,
        abort: &AbortFlag,
        result: &mut TaskResult,
    ) -> Option<WriterOutput> {
        let capacity = self.spec.options().queue_capacity();
        let (read_sender, read_queue) = block_queue::<DataBlock>(capacity, abort.clone());
        let write_queue: ReorderQueue<DataBlock> = ReorderQueue::new(capacity, abort.clone());
        let plan = PlanSignal::new(abort.clone());
        let events = self.events.as_ref();
        let workload = self.workload.as_ref();

        tracing::debug!(
            target: tags::TARGET_TASK,
            inside_path = %self.spec.object.inside_path,
            threads = self.spec.thread_count,
            block_size = self.spec.block_size,
            capacity,
            "starting task stages"
        );

        let (reader, pool, writer) = thread::scope(|scope| {
            let plan = &plan;
            let reader = scope.spawn(move || {
                run_stage(StageKind::Reader, events, abort, || {
                    stages.source.run(read_sender, plan, workload, abort)
                })
            });
            let pool = scope.spawn(|| {
                run_stage(StageKind::Pool, events, abort, || {
                    stages.pool.run(&read_queue, &write_queue, abort)
                })
            });
            let writer = scope.spawn(|| {
                run_stage(StageKind::Writer, events, abort, || {
                    stages
                        .target
                        .run(&write_queue, plan, events, workload, abort)
                })
            });

            (
                join_stage(reader, StageKind::Reader),
                join_stage(pool, StageKind::Pool),
                join_stage(writer, StageKind::Writer),
            )
        });

        if let Some(blocks) = pool.1 {
            tracing::debug!(target: tags::TARGET_TASK, blocks, "worker pool finished");
        }
        result.add_stage(reader.0);
        result.add_stage(pool.0);
        result.add_stage(writer.0);
        writer.1
    }
}

/// True when some stage never reached an outcome, i.e. it unwound on abort.
fn stopped_early(stages: &[WorkerResult]) -> bool {
    stages.iter().any(|stage| stage.result == ResultType::None)
}

fn join_stage<T>(
    handle: thread::ScopedJoinHandle<'_, (WorkerResult, Option<T>)>,
    stage: StageKind,
) -> (WorkerResult, Option<T>) {
    handle.join().unwrap_or_else(|_| {
        let mut result = WorkerResult::new(stage);
        result.add_error(ParzError::Other(anyhow::anyhow!("{stage} thread panicked")).to_string());
        (result, None)
    })
}
