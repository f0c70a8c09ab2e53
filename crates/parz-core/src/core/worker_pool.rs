use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::compression::BlockTransform;
use crate::core::abort::AbortFlag;
use crate::core::block_queue::BlockReceiver;
use crate::core::reorder_queue::ReorderQueue;
use crate::telemetry::tags;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::DataBlock;
use crate::{ParzError, Result};

/// Stage of N threads moving blocks from the read queue to the write queue
/// through a [`BlockTransform`].
pub struct WorkerPool {
    num_workers: usize,
    transform: BlockTransform,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl WorkerPool {
    /// Creates a worker pool using the default worker telemetry implementation.
    pub fn new(num_workers: usize, transform: BlockTransform) -> Self {
        Self::with_telemetry(num_workers, transform, Arc::new(DefaultWorkerTelemetry))
    }

    /// Creates a worker pool with a custom telemetry backend.
    pub fn with_telemetry(
        num_workers: usize,
        transform: BlockTransform,
        telemetry: Arc<dyn WorkerTelemetry>,
    ) -> Self {
        Self {
            num_workers: num_workers.max(1),
            transform,
            telemetry,
        }
    }

    /// Number of workers configured in this pool.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn transform(&self) -> BlockTransform {
        self.transform
    }

    /// Runs all workers until the read queue reports end of stream, then
    /// closes the write queue. Returns the number of blocks transformed.
    ///
    /// The first failing worker raises `abort` so every other stage unwinds.
    ///
    /// # Errors
    /// Returns the first worker error, or [`ParzError::Cancelled`] when the
    /// pool stopped because another stage raised the abort flag.
    pub fn run(
        &self,
        input: &BlockReceiver<DataBlock>,
        output: &ReorderQueue<DataBlock>,
        abort: &AbortFlag,
    ) -> Result<usize> {
        let started_at = Instant::now();
        let outcomes: Vec<Result<usize>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.num_workers)
                .map(|worker_id| {
                    scope.spawn(move || self.run_worker(worker_id, input, output, abort))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|payload| {
                        abort.raise();
                        Err(ParzError::CompressionError(format!(
                            "worker thread panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    })
                })
                .collect()
        });
        output.close();

        let mut transformed = 0usize;
        let mut first_error = None;
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                Ok(blocks) => transformed += blocks,
                Err(error) if error.is_cancelled() => cancelled = true,
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        if cancelled {
            return Err(ParzError::Cancelled);
        }

        tracing::debug!(
            target: tags::TARGET_WORKER,
            transform = self.transform.label(),
            workers = self.num_workers,
            blocks = transformed,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "worker pool drained"
        );
        Ok(transformed)
    }

    fn run_worker(
        &self,
        worker_id: usize,
        input: &BlockReceiver<DataBlock>,
        output: &ReorderQueue<DataBlock>,
        abort: &AbortFlag,
    ) -> Result<usize> {
        let worker_started = Instant::now();
        let mut busy = Duration::ZERO;
        let mut blocks = 0usize;

        while let Some(block) = input.pop()? {
            let seq = block.seq();
            self.telemetry.on_block_taken(worker_id, seq, input.len());

            let started_at = Instant::now();
            let result = match catch_unwind(AssertUnwindSafe(|| self.transform.apply(block))) {
                Ok(result) => result,
                Err(payload) => Err(ParzError::CompressionError(format!(
                    "worker task panicked while transforming block {seq}: {}",
                    panic_message(payload.as_ref())
                ))),
            };
            let elapsed = started_at.elapsed();
            busy += elapsed;

            let transformed = match result {
                Ok(transformed) => {
                    self.telemetry
                        .on_block_transformed(worker_id, seq, self.transform, elapsed);
                    transformed
                }
                Err(error) => {
                    self.telemetry
                        .on_block_failed(worker_id, seq, self.transform, &error);
                    abort.raise();
                    return Err(error.with_context(format!("worker {worker_id}")));
                }
            };

            output.push(seq, transformed)?;
            blocks += 1;
        }

        self.telemetry
            .on_worker_drained(worker_id, blocks, busy, worker_started.elapsed());
        Ok(blocks)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::compression::deflate;
    use crate::core::block_queue::block_queue;

    #[derive(Default)]
    struct RecordingTelemetry {
        drained: Mutex<Vec<(usize, usize)>>,
        failed: Mutex<Vec<u64>>,
    }

    impl WorkerTelemetry for RecordingTelemetry {
        fn on_block_taken(&self, _worker_id: usize, _seq: u64, _backlog: usize) {}

        fn on_block_transformed(
            &self,
            _worker_id: usize,
            _seq: u64,
            _transform: BlockTransform,
            _elapsed: Duration,
        ) {
        }

        fn on_block_failed(
            &self,
            _worker_id: usize,
            seq: u64,
            _transform: BlockTransform,
            _error: &ParzError,
        ) {
            self.failed.lock().expect("failed lock").push(seq);
        }

        fn on_worker_drained(
            &self,
            worker_id: usize,
            blocks: usize,
            _busy: Duration,
            _uptime: Duration,
        ) {
            self.drained
                .lock()
                .expect("drained lock")
                .push((worker_id, blocks));
        }
    }

    #[test]
    fn pool_transforms_every_block_in_order() {
        let abort = AbortFlag::new();
        let (sender, input) = block_queue(6, abort.clone());
        let output = ReorderQueue::new(6, abort.clone());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let pool = WorkerPool::with_telemetry(3, BlockTransform::Compress, telemetry.clone());

        let payloads: Vec<Vec<u8>> = (0..40u8).map(|seed| vec![seed; 300 + seed as usize]).collect();
        let drained = thread::scope(|scope| {
            let payloads = &payloads;
            scope.spawn(move || {
                for (seq, payload) in payloads.iter().enumerate() {
                    sender
                        .push(DataBlock::new(seq as u64, payload.clone()).expect("block"))
                        .expect("push");
                }
            });
            let pool_run = scope.spawn(|| pool.run(&input, &output, &abort));

            let mut drained = Vec::new();
            while let Some(block) = output.pop().expect("pop") {
                drained.push(block);
            }
            let transformed = pool_run.join().expect("pool thread").expect("pool run");
            assert_eq!(transformed, payloads.len());
            drained
        });

        for (seq, block) in drained.iter().enumerate() {
            assert_eq!(block.seq(), seq as u64);
            let restored = deflate::decompress_exact(block.payload(), payloads[seq].len())
                .expect("decompress");
            assert_eq!(restored, payloads[seq]);
        }

        let per_worker = telemetry.drained.lock().expect("drained lock").clone();
        assert_eq!(per_worker.len(), 3);
        assert_eq!(
            per_worker.iter().map(|(_, blocks)| blocks).sum::<usize>(),
            payloads.len()
        );
    }

    #[test]
    fn failing_block_raises_abort() {
        let abort = AbortFlag::new();
        let (sender, input) = block_queue(4, abort.clone());
        let output = ReorderQueue::new(4, abort.clone());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let pool = WorkerPool::with_telemetry(2, BlockTransform::Decompress, telemetry.clone());

        sender
            .push(DataBlock::with_logical_size(0, 10, b"garbage".to_vec()))
            .expect("push");
        drop(sender);

        let error = pool.run(&input, &output, &abort).expect_err("decode must fail");
        assert!(!error.is_cancelled());
        assert!(abort.is_raised());
        assert_eq!(*telemetry.failed.lock().expect("failed lock"), vec![0]);
    }
}
