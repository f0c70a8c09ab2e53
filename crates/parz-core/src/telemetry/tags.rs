//! Stable `tracing` targets.

/// Tracing target for reader stage diagnostics.
pub const TARGET_READER: &str = "parz::reader";
/// Tracing target for worker pool diagnostics.
pub const TARGET_WORKER: &str = "parz::worker";
/// Tracing target for writer stage diagnostics.
pub const TARGET_WRITER: &str = "parz::writer";
/// Tracing target for per-object task orchestration.
pub const TARGET_TASK: &str = "parz::task";
/// Tracing target for archive metadata encode/decode.
pub const TARGET_FORMAT: &str = "parz::format";
/// Tracing target for the multi-object archiver.
pub const TARGET_ARCHIVER: &str = "parz::archiver";
/// Tracing target for workload sampling.
pub const TARGET_WORKLOAD: &str = "parz::workload";
