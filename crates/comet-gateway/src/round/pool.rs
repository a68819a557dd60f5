//! Reusable I/O buffers
//!
//! Buffers are checked out as [`PooledBuf`] guards and return to their pool on
//! drop. The pool counts buffers currently checked out so leaks show up in
//! tests and metrics.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Free list of fixed-size `BytesMut` buffers
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    buf_size: usize,
    max_idle: usize,
    outstanding: AtomicUsize,
}

impl BufferPool {
    /// Create a pool keeping at most `max_idle` buffers of `buf_size` bytes
    #[must_use]
    pub fn new(max_idle: usize, buf_size: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            buf_size,
            max_idle,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Check out a cleared buffer
    pub fn get(self: &Arc<Self>) -> PooledBuf {
        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buf_size));
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        PooledBuf {
            buf,
            pool: Arc::clone(self),
        }
    }

    fn put(&self, mut buf: BytesMut) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        buf.clear();
        // decoding splits frames off the front, restore the full size
        buf.reserve(self.buf_size);
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }

    /// Buffers currently checked out
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Buffers waiting for reuse
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }
}

/// A buffer on loan from a [`BufferPool`]
#[derive(Debug)]
pub struct PooledBuf {
    buf: BytesMut,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuf {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}
