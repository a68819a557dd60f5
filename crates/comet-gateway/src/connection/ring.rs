//! Fixed-capacity frame ring
//!
//! Single producer (the connection reader) and single consumer (the
//! dispatcher). Cursors are monotonically increasing atomics; a slot index is
//! `cursor & mask`.
//!
//! The cursors never hand one slot to both sides at once, so the per-slot
//! mutex is uncontended. It only gives the shared ring interior mutability
//! without `unsafe`.

use crate::protocol::Frame;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Ring capacity errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    #[error("ring buffer full")]
    Full,

    #[error("ring buffer empty")]
    Empty,
}

/// Power-of-two ring of reusable [`Frame`] slots
pub struct Ring {
    read: AtomicU64,
    write: AtomicU64,
    mask: u64,
    slots: Box<[Mutex<Frame>]>,
}

impl Ring {
    /// Create a ring holding at least `requested` frames
    ///
    /// The capacity is rounded up to the next power of two (minimum 1).
    #[must_use]
    pub fn new(requested: usize) -> Self {
        let capacity = requested.max(1).next_power_of_two();
        let slots = (0..capacity).map(|_| Mutex::new(Frame::default())).collect();
        Self {
            read: AtomicU64::new(0),
            write: AtomicU64::new(0),
            mask: capacity as u64 - 1,
            slots,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of committed, unread frames
    #[must_use]
    pub fn len(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        write.saturating_sub(read) as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the next write slot
    ///
    /// The slot becomes visible to the reader only after [`Ring::commit_write`].
    pub fn reserve_write(&self) -> Result<MutexGuard<'_, Frame>, RingError> {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if write - read >= self.slots.len() as u64 {
            return Err(RingError::Full);
        }
        Ok(self.slots[(write & self.mask) as usize].lock())
    }

    pub fn commit_write(&self) {
        self.write.fetch_add(1, Ordering::Release);
    }

    /// Borrow the oldest committed slot
    pub fn reserve_read(&self) -> Result<MutexGuard<'_, Frame>, RingError> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return Err(RingError::Empty);
        }
        Ok(self.slots[(read & self.mask) as usize].lock())
    }

    pub fn commit_read(&self) {
        self.read.fetch_add(1, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn slot(&self, index: usize) -> Frame {
        self.slots[index & self.mask as usize].lock().clone()
    }

    /// Zero both cursors
    pub fn reset(&self) {
        self.read.store(0, Ordering::Release);
        self.write.store(0, Ordering::Release);
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("capacity", &self.capacity())
            .field("read", &self.read.load(Ordering::Relaxed))
            .field("write", &self.write.load(Ordering::Relaxed))
            .finish()
    }
}
