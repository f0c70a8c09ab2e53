use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

pub mod abort;
pub mod block_queue;
pub mod reorder;
pub mod reorder_queue;
pub mod signal;
pub mod worker_pool;

pub use abort::{ABORT_POLL_INTERVAL, AbortFlag};
pub use block_queue::{BlockReceiver, BlockSender, block_queue};
pub use reorder::ReorderBuffer;
pub use reorder_queue::ReorderQueue;
pub use signal::{BlockPlan, PlanSignal};
pub use worker_pool::WorkerPool;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn wait_unpoisoned<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
) -> MutexGuard<'a, T> {
    match condvar.wait_timeout(guard, timeout) {
        Ok((guard, _)) => guard,
        Err(poisoned) => poisoned.into_inner().0,
    }
}
