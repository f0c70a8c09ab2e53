use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::format::ArchiveMetadata;
use crate::telemetry::WorkloadSample;
use crate::types::Mode;

/// Outcome of a stage, task, or whole run.
///
/// Variants are ordered by precedence: `Failed > Warning > Success > None`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ResultType {
    /// Nothing completed yet.
    #[default]
    None,
    Success,
    Warning,
    Failed,
}

impl ResultType {
    /// Combines two outcomes, keeping the one with higher precedence.
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    /// Returns true for outcomes that count as a successful run.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Warning)
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Pipeline stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Reader,
    Pool,
    Writer,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Reader => "reader",
            Self::Pool => "worker pool",
            Self::Writer => "writer",
        };
        f.write_str(label)
    }
}

/// Result of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub stage: StageKind,
    pub result: ResultType,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl WorkerResult {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            result: ResultType::None,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.result = ResultType::Failed;
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
        self.result = self.result.merge(ResultType::Warning);
    }

    /// Marks the stage as finished; a stage with no outcome yet becomes `Success`.
    pub fn complete(&mut self) {
        if self.result == ResultType::None {
            self.result = ResultType::Success;
        }
    }
}

/// Result of processing one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub mode: Mode,
    pub inside_path: String,
    pub original_size: u64,
    /// Length of the object's block stream in the archive.
    pub compressed_size: u64,
    pub header_offset: u64,
    /// Archive offset at which the object's block stream begins.
    pub data_offset: u64,
    /// Set when the task was stopped by an explicit cancel request.
    pub is_canceled: bool,
    pub workload: WorkloadSample,
    pub result: ResultType,
    pub stages: Vec<WorkerResult>,
    pub started_at: SystemTime,
    pub duration: Duration,
}

impl TaskResult {
    pub fn new(mode: Mode, inside_path: impl Into<String>, original_size: u64) -> Self {
        Self {
            mode,
            inside_path: inside_path.into(),
            original_size,
            compressed_size: 0,
            header_offset: 0,
            data_offset: 0,
            is_canceled: false,
            workload: WorkloadSample::default(),
            result: ResultType::None,
            stages: Vec::new(),
            started_at: SystemTime::now(),
            duration: Duration::ZERO,
        }
    }

    /// Records a stage outcome and folds it into the task result.
    ///
    /// A stage that failed or never completed fails the task; a warning
    /// downgrades a successful task.
    pub fn add_stage(&mut self, stage: WorkerResult) {
        self.result = match stage.result {
            ResultType::Failed | ResultType::None => ResultType::Failed,
            ResultType::Warning => self.result.merge(ResultType::Warning),
            ResultType::Success if self.result == ResultType::None => ResultType::Success,
            ResultType::Success => self.result,
        };
        self.stages.push(stage);
    }

    /// Marks the task as explicitly canceled, which always fails it.
    pub fn mark_canceled(&mut self) {
        self.is_canceled = true;
        self.result = ResultType::Failed;
    }

    /// All stage error messages, in stage order.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(|stage| stage.errors.iter().map(String::as_str))
    }
}

/// Result of a whole archive run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub mode: Mode,
    pub result: ResultType,
    pub tasks: Vec<TaskResult>,
    pub warnings: Vec<String>,
    /// Archive contents, filled by browse runs.
    pub archive: Option<ArchiveMetadata>,
}

impl ProcessingResult {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            result: ResultType::None,
            tasks: Vec::new(),
            warnings: Vec::new(),
            archive: None,
        }
    }

    /// Builds a failed result for a run that could not start.
    pub fn failed(mode: Mode) -> Self {
        let mut result = Self::new(mode);
        result.result = ResultType::Failed;
        result
    }

    pub fn add_task(&mut self, task: TaskResult) {
        self.result = self.result.merge(task.result);
        self.tasks.push(task);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
        self.result = self.result.merge(ResultType::Warning);
    }

    /// Raises the overall result to at least `result`.
    pub fn escalate(&mut self, result: ResultType) {
        self.result = self.result.merge(result);
    }

    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }

    pub fn total_original_size(&self) -> u64 {
        self.tasks.iter().map(|task| task.original_size).sum()
    }

    pub fn total_compressed_size(&self) -> u64 {
        self.tasks.iter().map(|task| task.compressed_size).sum()
    }

    pub fn total_duration(&self) -> Duration {
        self.tasks.iter().map(|task| task.duration).sum()
    }

    /// Workload averaged over tasks, weighted by each task's original size.
    pub fn average_workload(&self) -> WorkloadSample {
        let total = self.total_original_size();
        if total == 0 {
            return WorkloadSample::default();
        }

        let weighted = |pick: fn(&WorkloadSample) -> u8| -> u8 {
            let sum: f64 = self
                .tasks
                .iter()
                .map(|task| f64::from(pick(&task.workload)) * task.original_size as f64)
                .sum();
            (sum / total as f64).floor().clamp(0.0, 100.0) as u8
        };

        WorkloadSample {
            cpu_percent: weighted(|sample| sample.cpu_percent),
            read_percent: weighted(|sample| sample.read_percent),
            write_percent: weighted(|sample| sample.write_percent),
        }
    }
}
