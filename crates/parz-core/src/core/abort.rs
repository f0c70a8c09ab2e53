use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Longest time a blocking pipeline wait sleeps before re-checking the abort flag.
pub const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared, lock-free abort flag observed by every blocking wait of a task.
///
/// Clones share the same flag, so any thread (including an external caller)
/// can raise it and every stage sees it.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    raised: Arc<AtomicBool>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Returns [`ParzError::Cancelled`](crate::ParzError::Cancelled) once raised.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_raised() {
            Err(crate::ParzError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = AbortFlag::new();
        let other = flag.clone();
        assert!(flag.check().is_ok());

        other.raise();
        assert!(flag.is_raised());
        assert!(flag.check().is_err_and(|error| error.is_cancelled()));
    }
}
