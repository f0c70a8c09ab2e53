use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::core::AbortFlag;
use crate::report::{StageKind, WorkerResult};
use crate::telemetry::{Event, EventSink, tags};
use crate::{ParzError, Result};

/// Runs one stage body and turns its outcome into a [`WorkerResult`].
///
/// A failing or panicking stage raises `abort` and reports its error through
/// `events`. A stage that stopped because the flag was already raised keeps a
/// `None` result and reports nothing.
pub(crate) fn run_stage<T>(
    stage: StageKind,
    events: &dyn EventSink,
    abort: &AbortFlag,
    body: impl FnOnce() -> Result<T>,
) -> (WorkerResult, Option<T>) {
    let mut result = WorkerResult::new(stage);
    let outcome = match catch_unwind(AssertUnwindSafe(body)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(ParzError::Other(anyhow::anyhow!(
            "{stage} panicked: {}",
            panic_text(payload.as_ref())
        ))),
    };

    match outcome {
        Ok(value) => {
            result.complete();
            (result, Some(value))
        }
        Err(error) if error.is_cancelled() => {
            tracing::debug!(target: tags::TARGET_TASK, %stage, "stage stopped by abort");
            (result, None)
        }
        Err(error) => {
            abort.raise();
            let error = error.with_context(stage.to_string());
            tracing::warn!(target: tags::TARGET_TASK, %stage, %error, "stage failed");
            events.emit(Event::Error(error.to_string()));
            result.add_error(error.to_string());
            (result, None)
        }
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
