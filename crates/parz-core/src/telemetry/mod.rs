//! Logging targets, metrics, worker hooks, the event feed and workload sampling.

use std::time::Duration;

pub mod events;
pub mod metrics;
pub mod tags;
pub mod worker;
pub mod workload;

pub use events::{ChannelSink, Event, EventSink, NullSink};
pub use metrics::{
    Counter, Histogram, HistogramSnapshot, MetricsSnapshot, count, observe, reset, snapshot,
};
pub use worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use workload::{IoKind, IoScope, NoopWorkload, SystemWorkload, WorkloadMonitor, WorkloadSample};

/// Whole microseconds, saturating at `u64::MAX`.
#[inline]
pub fn duration_to_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
