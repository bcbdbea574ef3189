//! Chain head cell and the activity flag

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::Block;

/// Last applied block.
///
/// Readers get an `Arc` snapshot; the cell is only written from inside the
/// block sequence, so there is one writer at a time.
#[derive(Debug, Default)]
pub struct ChainHead {
    cell: RwLock<Option<Arc<Block>>>,
}

impl ChainHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Block>> {
        self.cell.read().clone()
    }

    pub fn height(&self) -> Option<u64> {
        self.cell.read().as_ref().map(|block| block.height)
    }

    pub(crate) fn set(&self, block: Arc<Block>) {
        *self.cell.write() = Some(block);
    }
}

/// "A write sequence is in progress", polled by shutdown logic.
///
/// Advisory only: nothing blocks on it.
#[derive(Debug, Clone, Default)]
pub struct ActivityFlag {
    active: Arc<AtomicBool>,
}

impl ActivityFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Set the flag until the returned guard drops
    pub(crate) fn raise(&self) -> ActivityGuard {
        self.active.store(true, Ordering::Release);
        ActivityGuard {
            active: Arc::clone(&self.active),
        }
    }
}

/// Clears the activity flag on drop, including early returns and panics
#[must_use = "the flag is cleared as soon as the guard is dropped"]
pub struct ActivityGuard {
    active: Arc<AtomicBool>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
