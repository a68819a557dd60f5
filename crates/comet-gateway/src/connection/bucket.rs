//! Registry shard
//!
//! Channels are sharded across buckets by key hash. Each bucket owns the
//! channels and rooms of its shard behind a single `RwLock`.

use super::channel::Channel;
use super::room::Room;
use crate::protocol::Frame;
use comet_common::BucketConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BucketError {
    #[error("key {0} already registered")]
    DuplicateKey(String),

    #[error("key {0} not registered")]
    NotRegistered(String),
}

#[derive(Debug, Default)]
struct BucketInner {
    channels: HashMap<String, Arc<Channel>>,
    rooms: HashMap<String, Room>,
}

impl BucketInner {
    fn is_registered(&self, channel: &Arc<Channel>) -> bool {
        self.channels
            .get(channel.key())
            .is_some_and(|current| Arc::ptr_eq(current, channel))
    }

    fn join_room(&mut self, room_id: &str, channel: &Arc<Channel>) {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id))
            .join(channel.clone());
        channel.set_room_id(Some(room_id.to_string()));
    }

    fn leave_room(&mut self, channel: &Arc<Channel>) {
        let Some(room_id) = channel.room_id() else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.leave(channel);
            if room.is_empty() {
                self.rooms.remove(&room_id);
            }
        }
        channel.set_room_id(None);
    }
}

/// One shard of the session registry
#[derive(Debug)]
pub struct Bucket {
    inner: RwLock<BucketInner>,
}

impl Bucket {
    #[must_use]
    pub fn new(config: &BucketConfig) -> Self {
        Self {
            inner: RwLock::new(BucketInner {
                channels: HashMap::with_capacity(config.channel),
                rooms: HashMap::with_capacity(config.room),
            }),
        }
    }

    /// Register a channel, joining `room_id` when given
    ///
    /// Fails without touching the registry if the key is taken.
    pub fn put(&self, room_id: Option<&str>, channel: Arc<Channel>) -> Result<(), BucketError> {
        let mut inner = self.inner.write();
        if inner.channels.contains_key(channel.key()) {
            return Err(BucketError::DuplicateKey(channel.key().to_string()));
        }
        if let Some(room_id) = room_id.filter(|id| !id.is_empty()) {
            inner.join_room(room_id, &channel);
        }
        inner.channels.insert(channel.key().to_string(), channel);
        Ok(())
    }

    /// Deregister a channel and leave its room
    ///
    /// Only removes the key mapping if it still points at this very channel.
    pub fn delete(&self, channel: &Arc<Channel>) -> bool {
        let mut inner = self.inner.write();
        if !inner.is_registered(channel) {
            return false;
        }
        inner.channels.remove(channel.key());
        inner.leave_room(channel);
        true
    }

    pub fn channel(&self, key: &str) -> Option<Arc<Channel>> {
        self.inner.read().channels.get(key).cloned()
    }

    /// Move a channel to `room_id`; an empty id only leaves the current room
    pub fn change_room(&self, room_id: &str, channel: &Arc<Channel>) -> Result<(), BucketError> {
        let mut inner = self.inner.write();
        if !inner.is_registered(channel) {
            return Err(BucketError::NotRegistered(channel.key().to_string()));
        }
        inner.leave_room(channel);
        if !room_id.is_empty() {
            inner.join_room(room_id, channel);
        }
        Ok(())
    }

    /// Push to every local channel accepting `op` on `platform`
    pub fn broadcast(&self, frame: &Frame, op: u32, platform: &str) -> usize {
        let inner = self.inner.read();
        let mut delivered = 0;
        for channel in inner.channels.values() {
            if channel.need_push(op, platform) && channel.push(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Push to the members of one room, filtered by the frame's own op
    pub fn broadcast_room(&self, room_id: &str, frame: &Frame) -> usize {
        self.inner
            .read()
            .rooms
            .get(room_id)
            .map_or(0, |room| room.broadcast(frame, frame.op, ""))
    }

    /// Occupant count reported in heartbeat replies, 0 for unknown rooms
    pub fn room_online(&self, room_id: &str) -> i32 {
        self.inner
            .read()
            .rooms
            .get(room_id)
            .map_or(0, Room::online)
    }

    /// Local occupant count of every non-empty room
    pub fn rooms_occupancy(&self) -> HashMap<String, i32> {
        self.inner
            .read()
            .rooms
            .iter()
            .filter(|(_, room)| !room.is_empty())
            .map(|(id, room)| (id.clone(), room.occupant_count()))
            .collect()
    }

    /// Install cluster-wide counts; rooms absent from `global` fall back to local counts
    pub fn merge_occupancy(&self, global: &HashMap<String, i32>) {
        let mut inner = self.inner.write();
        for (id, room) in &mut inner.rooms {
            room.set_all_online(global.get(id).copied().unwrap_or(0));
        }
    }

    pub fn room_ids(&self) -> Vec<String> {
        self.inner.read().rooms.keys().cloned().collect()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.read().channels.len()
    }

    pub fn room_count(&self) -> usize {
        self.inner.read().rooms.len()
    }
}
