use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::core::lock_unpoisoned;
use crate::telemetry::tags;

/// Direction of a disk operation reported to a [`WorkloadMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Read,
    Write,
}

/// Average load observed while a task ran, in whole percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSample {
    pub cpu_percent: u8,
    pub read_percent: u8,
    pub write_percent: u8,
}

/// Collaborator that tracks CPU and disk utilisation during a task.
///
/// Stages report disk activity through `enter_io`/`leave_io`; the orchestrator
/// brackets each task with `begin`/`end` and reads `sample` at any time.
pub trait WorkloadMonitor: Send + Sync {
    fn begin(&self);
    fn end(&self);
    fn enter_io(&self, kind: IoKind);
    fn leave_io(&self, kind: IoKind);
    fn sample(&self) -> WorkloadSample;
}

/// RAII guard pairing `enter_io` with `leave_io`.
pub struct IoScope<'a> {
    monitor: &'a dyn WorkloadMonitor,
    kind: IoKind,
}

impl<'a> IoScope<'a> {
    pub fn enter(monitor: &'a dyn WorkloadMonitor, kind: IoKind) -> Self {
        monitor.enter_io(kind);
        Self { monitor, kind }
    }
}

impl Drop for IoScope<'_> {
    fn drop(&mut self) {
        self.monitor.leave_io(self.kind);
    }
}

/// Monitor that records nothing and always reports zero load.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWorkload;

impl WorkloadMonitor for NoopWorkload {
    fn begin(&self) {}
    fn end(&self) {}
    fn enter_io(&self, _kind: IoKind) {}
    fn leave_io(&self, _kind: IoKind) {}
    fn sample(&self) -> WorkloadSample {
        WorkloadSample::default()
    }
}

/// Busy-time accumulator for one disk direction.
///
/// Load is the share of wall time since `reset` during which at least one
/// operation was in flight.
#[derive(Debug)]
struct DiskBusyCounter {
    state: Mutex<DiskBusyState>,
}

#[derive(Debug)]
struct DiskBusyState {
    started_at: Instant,
    busy: Duration,
    in_flight: usize,
    busy_since: Option<Instant>,
}

impl DiskBusyCounter {
    fn new() -> Self {
        Self {
            state: Mutex::new(DiskBusyState {
                started_at: Instant::now(),
                busy: Duration::ZERO,
                in_flight: 0,
                busy_since: None,
            }),
        }
    }

    fn reset(&self) {
        let mut state = lock_unpoisoned(&self.state);
        let now = Instant::now();
        state.started_at = now;
        state.busy = Duration::ZERO;
        state.busy_since = (state.in_flight > 0).then_some(now);
    }

    fn enter(&self) {
        let mut state = lock_unpoisoned(&self.state);
        if state.in_flight == 0 {
            state.busy_since = Some(Instant::now());
        }
        state.in_flight += 1;
    }

    fn leave(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            if let Some(since) = state.busy_since.take() {
                state.busy += since.elapsed();
            }
        }
    }

    fn load_percent(&self) -> u8 {
        let state = lock_unpoisoned(&self.state);
        let now = Instant::now();
        let total = now.duration_since(state.started_at);
        let mut busy = state.busy;
        if let Some(since) = state.busy_since {
            busy += now.duration_since(since);
        }
        percent_of(busy, total)
    }
}

fn percent_of(part: Duration, total: Duration) -> u8 {
    if total.is_zero() {
        return 0;
    }
    let ratio = part.as_secs_f64() / total.as_secs_f64();
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Default)]
struct PublishedLoad {
    cpu: AtomicU8,
    read: AtomicU8,
    write: AtomicU8,
}

#[derive(Debug)]
struct SamplerShared {
    read: DiskBusyCounter,
    write: DiskBusyCounter,
    published: PublishedLoad,
    running: AtomicBool,
}

/// Monitor backed by `sysinfo` CPU readings and disk busy-time counters.
///
/// A timer thread started by `begin` refreshes the CPU average and the disk
/// percentages and publishes them into atomics, so `sample` never blocks a
/// pipeline stage.
pub struct SystemWorkload {
    shared: Arc<SamplerShared>,
    interval: Duration,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl SystemWorkload {
    /// Sampling period of the timer thread.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_interval(Self::DEFAULT_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            shared: Arc::new(SamplerShared {
                read: DiskBusyCounter::new(),
                write: DiskBusyCounter::new(),
                published: PublishedLoad::default(),
                running: AtomicBool::new(false),
            }),
            interval: interval.max(Duration::from_millis(10)),
            sampler: Mutex::new(None),
        }
    }

    fn counter(&self, kind: IoKind) -> &DiskBusyCounter {
        match kind {
            IoKind::Read => &self.shared.read,
            IoKind::Write => &self.shared.write,
        }
    }

    fn stop_sampler(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = lock_unpoisoned(&self.sampler).take() {
            if handle.join().is_err() {
                tracing::warn!(target: tags::TARGET_WORKLOAD, "workload sampler thread panicked");
            }
        }
    }
}

impl Default for SystemWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SystemWorkload {
    fn drop(&mut self) {
        self.stop_sampler();
    }
}

impl WorkloadMonitor for SystemWorkload {
    fn begin(&self) {
        self.stop_sampler();
        self.shared.read.reset();
        self.shared.write.reset();
        self.shared.published.cpu.store(0, Ordering::Release);
        self.shared.published.read.store(0, Ordering::Release);
        self.shared.published.write.store(0, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name("parz-workload".to_string())
            .spawn(move || run_sampler(shared, interval));
        match spawned {
            Ok(handle) => *lock_unpoisoned(&self.sampler) = Some(handle),
            Err(error) => {
                self.shared.running.store(false, Ordering::Release);
                tracing::warn!(
                    target: tags::TARGET_WORKLOAD,
                    %error,
                    "failed to start workload sampler; CPU load will read as zero"
                );
            }
        }
    }

    fn end(&self) {
        self.stop_sampler();
        publish_disk_load(&self.shared);
    }

    fn enter_io(&self, kind: IoKind) {
        self.counter(kind).enter();
    }

    fn leave_io(&self, kind: IoKind) {
        self.counter(kind).leave();
    }

    fn sample(&self) -> WorkloadSample {
        let published = &self.shared.published;
        WorkloadSample {
            cpu_percent: published.cpu.load(Ordering::Acquire),
            read_percent: published.read.load(Ordering::Acquire),
            write_percent: published.write.load(Ordering::Acquire),
        }
    }
}

fn publish_disk_load(shared: &SamplerShared) {
    shared
        .published
        .read
        .store(shared.read.load_percent(), Ordering::Release);
    shared
        .published
        .write
        .store(shared.write.load_percent(), Ordering::Release);
}

fn run_sampler(shared: Arc<SamplerShared>, interval: Duration) {
    let mut system = System::new();
    system.refresh_cpu();
    let mut cpu_total = 0.0f64;
    let mut cpu_samples = 0u64;
    let tick = interval.min(Duration::from_millis(50));
    let mut last_refresh = Instant::now();

    while shared.running.load(Ordering::Acquire) {
        thread::sleep(tick);
        if last_refresh.elapsed() < interval {
            continue;
        }
        last_refresh = Instant::now();

        system.refresh_cpu();
        cpu_total += f64::from(system.global_cpu_info().cpu_usage());
        cpu_samples += 1;
        let cpu_average = (cpu_total / cpu_samples as f64).round().clamp(0.0, 100.0) as u8;
        shared.published.cpu.store(cpu_average, Ordering::Release);
        publish_disk_load(&shared);
    }

    tracing::trace!(
        target: tags::TARGET_WORKLOAD,
        cpu_samples,
        "workload sampler stopped"
    );
}
