//! Per-object block pipeline: one reader, a worker pool and one ordered
//! writer joined by bounded queues and a shared abort flag.

pub mod cancel;
pub mod reader;
mod stage;
pub mod task;
pub mod types;
pub mod writer;

pub use cancel::CancelHandle;
pub use reader::BlockSource;
pub use task::TaskOrchestrator;
pub use types::{PipelineOptions, TaskSpec};
pub use writer::{OutputTarget, WriterOutput};
