//! Per-connection session
//!
//! A [`Channel`] is what the registry hands out: identity, the inbound ring,
//! the outbound signal queue and the push filters of one connection.

use super::ring::Ring;
use crate::protocol::Frame;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// Transport accepted, handshake deadline armed
    Handshaking = 0,
    /// Waiting for the auth frame and the authority verdict
    Authenticating = 1,
    /// Registered and serving frames
    Active = 2,
    /// Tearing down
    Closing = 3,
    Closed = 4,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Handshaking,
            1 => Self::Authenticating,
            2 => Self::Active,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Handshaking => "handshaking",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared, lock-free holder of a [`ChannelState`]
///
/// Created before the channel exists so timer callbacks can report the state
/// a deadline fired in.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    #[must_use]
    pub fn new(state: ChannelState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ChannelState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Wake-ups delivered to a connection's dispatcher
#[derive(Debug)]
pub enum Signal {
    /// The ring holds replies to write
    Ready,
    /// A frame pushed from the registry
    Push(Frame),
    /// The reader is done; exit after this
    Finish,
}

/// Push errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("signal queue full, frame dropped")]
    SignalFull,

    #[error("channel closed")]
    Closed,
}

/// Identity assigned by the authority at handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub key: String,
    pub user_id: i64,
    pub platform: String,
    pub ip: String,
}

/// An authenticated connection
pub struct Channel {
    info: SessionInfo,
    ring: Ring,
    signal: mpsc::Sender<Signal>,
    room_id: RwLock<Option<String>>,
    /// Empty means every op is accepted
    watch_ops: RwLock<HashSet<u32>>,
    state: Arc<StateCell>,
    created_at: Instant,
}

impl Channel {
    /// Create a channel and the receiving end of its signal queue
    ///
    /// `ring_size` is rounded up to a power of two; `signal_size` bounds the
    /// number of undelivered signals before pushes start failing.
    pub fn new(
        info: SessionInfo,
        state: Arc<StateCell>,
        ring_size: usize,
        signal_size: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Signal>) {
        let (signal, signals) = mpsc::channel(signal_size.max(1));
        let channel = Arc::new(Self {
            info,
            ring: Ring::new(ring_size),
            signal,
            room_id: RwLock::new(None),
            watch_ops: RwLock::new(HashSet::new()),
            state,
            created_at: Instant::now(),
        });
        (channel, signals)
    }

    pub fn key(&self) -> &str {
        &self.info.key
    }

    pub fn user_id(&self) -> i64 {
        self.info.user_id
    }

    pub fn platform(&self) -> &str {
        &self.info.platform
    }

    pub fn ip(&self) -> &str {
        &self.info.ip
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    pub fn set_state(&self, state: ChannelState) {
        self.state.set(state);
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Current room, if any
    pub fn room_id(&self) -> Option<String> {
        self.room_id.read().clone()
    }

    /// Only called by the bucket while it holds its write lock
    pub(crate) fn set_room_id(&self, room_id: Option<String>) {
        *self.room_id.write() = room_id;
    }

    /// Add ops to the watch set
    pub fn watch(&self, ops: &[u32]) {
        self.watch_ops.write().extend(ops.iter().copied());
    }

    /// Remove ops from the watch set
    pub fn unwatch(&self, ops: &[u32]) {
        let mut watch_ops = self.watch_ops.write();
        for op in ops {
            watch_ops.remove(op);
        }
    }

    /// Sorted snapshot of the watch set
    pub fn watched_ops(&self) -> Vec<u32> {
        let mut ops: Vec<u32> = self.watch_ops.read().iter().copied().collect();
        ops.sort_unstable();
        ops
    }

    /// Whether a pushed frame with `op` should reach this connection
    ///
    /// An empty `platform` matches every connection.
    pub fn need_push(&self, op: u32, platform: &str) -> bool {
        if !platform.is_empty() && platform != self.info.platform {
            return false;
        }
        let watch_ops = self.watch_ops.read();
        watch_ops.is_empty() || watch_ops.contains(&op)
    }

    /// Enqueue a pushed frame without waiting
    pub fn push(&self, frame: Frame) -> Result<(), ChannelError> {
        self.signal
            .try_send(Signal::Push(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ChannelError::SignalFull,
                mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
            })
    }

    /// Tell the dispatcher the ring has frames
    pub async fn signal(&self) {
        if self.signal.send(Signal::Ready).await.is_err() {
            tracing::trace!(key = %self.info.key, "signal after dispatcher exit");
        }
    }

    /// Tell the dispatcher to finish
    pub async fn close(&self) {
        let _ = self.signal.send(Signal::Finish).await;
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("key", &self.info.key)
            .field("user_id", &self.info.user_id)
            .field("platform", &self.info.platform)
            .field("room_id", &self.room_id())
            .field("state", &self.state())
            .finish()
    }
}
