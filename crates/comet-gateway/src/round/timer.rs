//! Hashed timer wheel
//!
//! Deadlines are bucketed into `slots` by expiry tick. A driver task advances
//! the wheel every tick and fires due callbacks outside the wheel lock, so a
//! callback may freely add, rearm or delete timers.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey(u64);

struct Entry {
    slot: usize,
    expires: u64,
    callback: Callback,
}

struct WheelState {
    tick: u64,
    next_id: u64,
    slots: Vec<HashSet<u64>>,
    entries: HashMap<u64, Entry>,
}

/// Timer wheel shared by the connections of one round slot
pub struct TimerWheel {
    state: Mutex<WheelState>,
    tick: Duration,
}

impl TimerWheel {
    /// Create a wheel with `slots` buckets advancing every `tick`
    #[must_use]
    pub fn new(slots: usize, tick: Duration) -> Self {
        let slots = slots.max(1);
        Self {
            state: Mutex::new(WheelState {
                tick: 0,
                next_id: 0,
                slots: vec![HashSet::new(); slots],
                entries: HashMap::new(),
            }),
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick
    }

    /// Number of pending deadlines
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ticks_for(&self, delay: Duration) -> u64 {
        let tick = self.tick.as_nanos();
        (delay.as_nanos().div_ceil(tick) as u64).max(1)
    }

    fn schedule(&self, state: &mut WheelState, id: u64, delay: Duration) -> (usize, u64) {
        let expires = state.tick + self.ticks_for(delay);
        let slot = (expires % state.slots.len() as u64) as usize;
        state.slots[slot].insert(id);
        (slot, expires)
    }

    /// Schedule `callback` to run once after `delay`
    pub fn add<F>(&self, delay: Duration, callback: F) -> TimerKey
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let (slot, expires) = self.schedule(&mut state, id, delay);
        state.entries.insert(
            id,
            Entry {
                slot,
                expires,
                callback: Box::new(callback),
            },
        );
        TimerKey(id)
    }

    /// Rearm a pending deadline to fire `delay` from now
    ///
    /// Returns false if the timer already fired or was deleted.
    pub fn set(&self, key: TimerKey, delay: Duration) -> bool {
        let mut state = self.state.lock();
        let Some(old_slot) = state.entries.get(&key.0).map(|entry| entry.slot) else {
            return false;
        };
        state.slots[old_slot].remove(&key.0);
        let (slot, expires) = self.schedule(&mut state, key.0, delay);
        if let Some(entry) = state.entries.get_mut(&key.0) {
            entry.slot = slot;
            entry.expires = expires;
        }
        true
    }

    /// Cancel a pending deadline
    pub fn del(&self, key: TimerKey) -> bool {
        let mut state = self.state.lock();
        match state.entries.remove(&key.0) {
            Some(entry) => {
                state.slots[entry.slot].remove(&key.0);
                true
            }
            None => false,
        }
    }

    /// Advance one tick and run every callback that came due
    ///
    /// Returns the number of callbacks fired.
    pub fn advance(&self) -> usize {
        let due: Vec<Callback> = {
            let mut state = self.state.lock();
            state.tick += 1;
            let now = state.tick;
            let slot = (now % state.slots.len() as u64) as usize;

            let ready: Vec<u64> = state.slots[slot]
                .iter()
                .copied()
                .filter(|id| state.entries.get(id).is_some_and(|e| e.expires <= now))
                .collect();

            ready
                .into_iter()
                .filter_map(|id| {
                    state.slots[slot].remove(&id);
                    state.entries.remove(&id).map(|entry| entry.callback)
                })
                .collect()
        };

        let fired = due.len();
        for callback in due {
            callback();
        }
        fired
    }

    /// Spawn the task that drives this wheel
    ///
    /// The task holds only a weak reference and exits once the wheel is dropped.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let wheel: Weak<Self> = Arc::downgrade(self);
        let period = self.tick;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(wheel) = wheel.upgrade() else {
                    break;
                };
                wheel.advance();
            }
        })
    }
}

impl std::fmt::Debug for TimerWheel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimerWheel")
            .field("tick", &self.tick)
            .field("slots", &state.slots.len())
            .field("pending", &state.entries.len())
            .finish()
    }
}
