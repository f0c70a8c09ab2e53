use std::sync::{Condvar, Mutex};

use crate::core::abort::{ABORT_POLL_INTERVAL, AbortFlag};
use crate::core::{lock_unpoisoned, wait_unpoisoned};
use crate::{ParzError, Result};

/// Block layout of one object, known to the reader before streaming starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    pub block_count: u64,
    /// Original size of the final block, when the source knows it up front.
    pub last_block_size: Option<u32>,
}

impl BlockPlan {
    /// Computes the plan for a raw source of `len` bytes split into `block_size` blocks.
    ///
    /// An empty source still yields one (empty) block.
    pub fn for_source(len: u64, block_size: u32) -> Self {
        let block_size = u64::from(block_size.max(1));
        let block_count = len.div_ceil(block_size).max(1);
        let last_block_size = len - (block_count - 1) * block_size;
        Self {
            block_count,
            last_block_size: Some(last_block_size as u32),
        }
    }
}

/// Single-shot hand-off of the [`BlockPlan`] from the reader to the writer.
#[derive(Debug)]
pub struct PlanSignal {
    plan: Mutex<Option<BlockPlan>>,
    published: Condvar,
    abort: AbortFlag,
}

impl PlanSignal {
    pub fn new(abort: AbortFlag) -> Self {
        Self {
            plan: Mutex::new(None),
            published: Condvar::new(),
            abort,
        }
    }

    /// Publishes the plan.
    ///
    /// # Errors
    /// Returns an error if a plan was already published.
    pub fn publish(&self, plan: BlockPlan) -> Result<()> {
        let mut slot = lock_unpoisoned(&self.plan);
        if slot.is_some() {
            return Err(ParzError::InvalidFormat("block plan published twice"));
        }
        *slot = Some(plan);
        drop(slot);
        self.published.notify_all();
        Ok(())
    }

    /// Blocks until the plan is published.
    ///
    /// # Errors
    /// Returns [`ParzError::Cancelled`] once the abort flag is raised.
    pub fn wait(&self) -> Result<BlockPlan> {
        let mut slot = lock_unpoisoned(&self.plan);
        loop {
            self.abort.check()?;
            if let Some(plan) = *slot {
                return Ok(plan);
            }
            slot = wait_unpoisoned(&self.published, slot, ABORT_POLL_INTERVAL);
        }
    }

    pub fn get(&self) -> Option<BlockPlan> {
        *lock_unpoisoned(&self.plan)
    }
}
