use std::time::Duration;

use crate::compression::BlockTransform;
use crate::error::ParzError;
use crate::telemetry::metrics::{self, Counter, Histogram};
use crate::telemetry::{duration_to_us, tags};

/// Hooks the worker pool calls around every block it transforms.
pub trait WorkerTelemetry: Send + Sync {
    /// Worker `worker_id` took block `seq`; `backlog` blocks are still queued.
    fn on_block_taken(&self, worker_id: usize, seq: u64, backlog: usize);
    fn on_block_transformed(
        &self,
        worker_id: usize,
        seq: u64,
        transform: BlockTransform,
        elapsed: Duration,
    );
    fn on_block_failed(
        &self,
        worker_id: usize,
        seq: u64,
        transform: BlockTransform,
        error: &ParzError,
    );
    /// The read queue reached end of stream for this worker.
    fn on_worker_drained(&self, worker_id: usize, blocks: usize, busy: Duration, uptime: Duration);
}

/// Feeds the metrics registry and `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_block_taken(&self, _worker_id: usize, _seq: u64, backlog: usize) {
        metrics::observe(Histogram::ReadBacklog, backlog as u64);
    }

    fn on_block_transformed(
        &self,
        worker_id: usize,
        seq: u64,
        transform: BlockTransform,
        elapsed: Duration,
    ) {
        let elapsed_us = duration_to_us(elapsed);
        metrics::observe(Histogram::TransformLatencyUs, elapsed_us);
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            seq,
            transform = transform.label(),
            elapsed_us,
            "block transformed"
        );
    }

    fn on_block_failed(
        &self,
        worker_id: usize,
        seq: u64,
        transform: BlockTransform,
        error: &ParzError,
    ) {
        metrics::count(Counter::TransformFailures, 1);
        tracing::debug!(
            target: tags::TARGET_WORKER,
            worker_id,
            seq,
            transform = transform.label(),
            %error,
            "block transform failed"
        );
    }

    fn on_worker_drained(&self, worker_id: usize, blocks: usize, busy: Duration, uptime: Duration) {
        let utilization = if uptime.is_zero() {
            0.0
        } else {
            busy.as_secs_f64() / uptime.as_secs_f64()
        };
        tracing::debug!(
            target: tags::TARGET_WORKER,
            worker_id,
            blocks,
            busy_ms = busy.as_millis() as u64,
            utilization,
            "worker drained"
        );
    }
}
