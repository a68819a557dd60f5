//! Worker round
//!
//! Fixed sets of timer wheels and reader/writer buffer pools. Connection *n*
//! uses slot `n % size` of each set, which spreads lock contention.

mod pool;
mod timer;

pub use pool::{BufferPool, PooledBuf};
pub use timer::{TimerKey, TimerWheel};

use comet_common::RoundConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Timer wheels and buffer pools shared by all connections
#[derive(Debug)]
pub struct Round {
    timers: Vec<Arc<TimerWheel>>,
    readers: Vec<Arc<BufferPool>>,
    writers: Vec<Arc<BufferPool>>,
    drivers: Vec<JoinHandle<()>>,
}

impl Round {
    /// Build the round and start one driver task per timer wheel
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: &RoundConfig) -> Self {
        let timers: Vec<Arc<TimerWheel>> = (0..config.timer.max(1))
            .map(|_| Arc::new(TimerWheel::new(config.timer_slots, config.timer_tick())))
            .collect();
        let drivers = timers.iter().map(TimerWheel::start).collect();
        let readers = (0..config.reader.max(1))
            .map(|_| Arc::new(BufferPool::new(config.read_buf, config.read_buf_size)))
            .collect();
        let writers = (0..config.writer.max(1))
            .map(|_| Arc::new(BufferPool::new(config.write_buf, config.write_buf_size)))
            .collect();

        tracing::debug!(
            timers = config.timer,
            readers = config.reader,
            writers = config.writer,
            "round created"
        );

        Self {
            timers,
            readers,
            writers,
            drivers,
        }
    }

    pub fn timer(&self, n: usize) -> &Arc<TimerWheel> {
        &self.timers[n % self.timers.len()]
    }

    pub fn reader(&self, n: usize) -> &Arc<BufferPool> {
        &self.readers[n % self.readers.len()]
    }

    pub fn writer(&self, n: usize) -> &Arc<BufferPool> {
        &self.writers[n % self.writers.len()]
    }

    /// Buffers checked out across every pool
    pub fn outstanding_buffers(&self) -> usize {
        self.readers
            .iter()
            .chain(&self.writers)
            .map(|pool| pool.outstanding())
            .sum()
    }

    /// Deadlines pending across every wheel
    pub fn pending_timers(&self) -> usize {
        self.timers.iter().map(|wheel| wheel.len()).sum()
    }
}

impl Drop for Round {
    fn drop(&mut self) {
        for driver in &self.drivers {
            driver.abort();
        }
    }
}
