//! Process-wide pipeline metrics.
//!
//! Recording compiles to nothing unless the `telemetry` feature is enabled.
//! Counters are plain atomics indexed by [`Counter`], so stages never take a
//! lock to count a block.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Monotonic counters kept by the pipeline and the archive codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    ReaderBlocks,
    ReaderBytes,
    WriterBlocks,
    WriterBytes,
    TransformedBlocks,
    TransformInputBytes,
    TransformOutputBytes,
    TransformFailures,
    RecordsWritten,
    RecordsValidated,
    ChecksumFailures,
    Tasks,
    CanceledTasks,
}

impl Counter {
    pub const ALL: [Counter; 13] = [
        Counter::ReaderBlocks,
        Counter::ReaderBytes,
        Counter::WriterBlocks,
        Counter::WriterBytes,
        Counter::TransformedBlocks,
        Counter::TransformInputBytes,
        Counter::TransformOutputBytes,
        Counter::TransformFailures,
        Counter::RecordsWritten,
        Counter::RecordsValidated,
        Counter::ChecksumFailures,
        Counter::Tasks,
        Counter::CanceledTasks,
    ];

    /// Stable exported name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ReaderBlocks => "parz.reader.blocks",
            Self::ReaderBytes => "parz.reader.bytes",
            Self::WriterBlocks => "parz.writer.blocks",
            Self::WriterBytes => "parz.writer.bytes",
            Self::TransformedBlocks => "parz.transform.blocks",
            Self::TransformInputBytes => "parz.transform.input_bytes",
            Self::TransformOutputBytes => "parz.transform.output_bytes",
            Self::TransformFailures => "parz.transform.failures",
            Self::RecordsWritten => "parz.format.records_written",
            Self::RecordsValidated => "parz.format.records_validated",
            Self::ChecksumFailures => "parz.format.checksum_failures",
            Self::Tasks => "parz.task.count",
            Self::CanceledTasks => "parz.task.canceled",
        }
    }
}

/// Distributions summarized as count/sum/min/max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Histogram {
    /// Time one worker spent transforming one block.
    TransformLatencyUs,
    /// Wall time of one object task.
    TaskLatencyUs,
    /// Read-queue length seen by a worker right after taking a block.
    ReadBacklog,
}

impl Histogram {
    pub const ALL: [Histogram; 3] = [
        Histogram::TransformLatencyUs,
        Histogram::TaskLatencyUs,
        Histogram::ReadBacklog,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::TransformLatencyUs => "parz.transform.latency_us",
            Self::TaskLatencyUs => "parz.task.latency_us",
            Self::ReadBacklog => "parz.worker.read_backlog",
        }
    }
}

/// Summary of one histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl HistogramSnapshot {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// Point-in-time copy of every metric that has been recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl MetricsSnapshot {
    /// Counter value; zero when nothing was recorded.
    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters.get(counter.name()).copied().unwrap_or(0)
    }

    pub fn histogram(&self, histogram: Histogram) -> Option<HistogramSnapshot> {
        self.histograms.get(histogram.name()).copied()
    }
}

#[inline]
pub fn count(counter: Counter, value: u64) {
    #[cfg(feature = "telemetry")]
    registry::count(counter, value);

    let _ = (counter, value);
}

#[inline]
pub fn observe(histogram: Histogram, value: u64) {
    #[cfg(feature = "telemetry")]
    registry::observe(histogram, value);

    let _ = (histogram, value);
}

pub fn snapshot() -> MetricsSnapshot {
    #[cfg(feature = "telemetry")]
    {
        return registry::snapshot();
    }

    #[cfg(not(feature = "telemetry"))]
    {
        MetricsSnapshot::default()
    }
}

/// Zeroes every metric.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::reset();
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::{Counter, Histogram, HistogramSnapshot, MetricsSnapshot};
    use crate::core::lock_unpoisoned;

    static COUNTERS: [AtomicU64; Counter::ALL.len()] =
        [const { AtomicU64::new(0) }; Counter::ALL.len()];
    static HISTOGRAMS: Mutex<[HistogramSnapshot; Histogram::ALL.len()]> = Mutex::new(
        [HistogramSnapshot {
            count: 0,
            sum: 0,
            min: 0,
            max: 0,
        }; Histogram::ALL.len()],
    );

    pub(super) fn count(counter: Counter, value: u64) {
        COUNTERS[counter as usize].fetch_add(value, Ordering::Relaxed);
    }

    pub(super) fn observe(histogram: Histogram, value: u64) {
        let mut histograms = lock_unpoisoned(&HISTOGRAMS);
        let entry = &mut histograms[histogram as usize];
        if entry.count == 0 {
            entry.min = value;
            entry.max = value;
        } else {
            entry.min = entry.min.min(value);
            entry.max = entry.max.max(value);
        }
        entry.count += 1;
        entry.sum = entry.sum.saturating_add(value);
    }

    pub(super) fn snapshot() -> MetricsSnapshot {
        let counters = Counter::ALL
            .iter()
            .map(|counter| (*counter, COUNTERS[*counter as usize].load(Ordering::Relaxed)))
            .filter(|(_, value)| *value > 0)
            .map(|(counter, value)| (counter.name().to_string(), value))
            .collect();

        let recorded = *lock_unpoisoned(&HISTOGRAMS);
        let histograms = Histogram::ALL
            .iter()
            .map(|histogram| (*histogram, recorded[*histogram as usize]))
            .filter(|(_, summary)| summary.count > 0)
            .map(|(histogram, summary)| (histogram.name().to_string(), summary))
            .collect();

        MetricsSnapshot {
            counters,
            histograms,
        }
    }

    pub(super) fn reset() {
        for counter in &COUNTERS {
            counter.store(0, Ordering::Relaxed);
        }
        *lock_unpoisoned(&HISTOGRAMS) = [HistogramSnapshot::default(); Histogram::ALL.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = Counter::ALL.iter().map(|counter| counter.name()).collect();
        names.extend(Histogram::ALL.iter().map(|histogram| histogram.name()));
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn enum_order_matches_tables() {
        for (index, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(*counter as usize, index);
        }
        for (index, histogram) in Histogram::ALL.iter().enumerate() {
            assert_eq!(*histogram as usize, index);
        }
    }

    #[test]
    fn missing_counter_reads_zero() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.counter(Counter::Tasks), 0);
        assert!(snapshot.histogram(Histogram::TaskLatencyUs).is_none());
        assert_eq!(HistogramSnapshot::default().mean(), 0.0);
    }
}
