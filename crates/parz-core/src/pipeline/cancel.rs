use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::{AbortFlag, lock_unpoisoned};

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    active: Mutex<Option<AbortFlag>>,
}

/// Cloneable handle that cancels a task, or every remaining task of a run.
///
/// Cancelling raises the abort flag of the task currently attached, so all of
/// its stages unwind at their next blocking wait, and marks the request so the
/// task result is flagged as canceled rather than failed.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.requested.store(true, Ordering::Release);
        if let Some(abort) = lock_unpoisoned(&self.state.active).as_ref() {
            abort.raise();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.state.requested.load(Ordering::Acquire)
    }

    /// Binds a running task's abort flag; raised at once if already canceled.
    pub(crate) fn attach(&self, abort: &AbortFlag) {
        let mut active = lock_unpoisoned(&self.state.active);
        *active = Some(abort.clone());
        if self.is_canceled() {
            abort.raise();
        }
    }

    pub(crate) fn detach(&self) {
        lock_unpoisoned(&self.state.active).take();
    }

    /// Clears a served request so the next run starts uncanceled.
    pub(crate) fn reset(&self) {
        self.state.requested.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reaches_attached_flag() {
        let handle = CancelHandle::new();
        let abort = AbortFlag::new();
        handle.attach(&abort);
        handle.clone().cancel();
        assert!(abort.is_raised());
        assert!(handle.is_canceled());
    }

    #[test]
    fn late_attach_sees_earlier_cancel() {
        let handle = CancelHandle::new();
        handle.cancel();
        let abort = AbortFlag::new();
        handle.attach(&abort);
        assert!(abort.is_raised());
        handle.detach();
    }

    #[test]
    fn reset_clears_request_for_next_task() {
        let handle = CancelHandle::new();
        handle.cancel();
        handle.reset();
        assert!(!handle.is_canceled());

        let abort = AbortFlag::new();
        handle.attach(&abort);
        assert!(!abort.is_raised());
        handle.detach();
    }
}
