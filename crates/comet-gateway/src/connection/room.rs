//! Room membership
//!
//! A room has no lock of its own; it lives inside a bucket and is only touched
//! while that bucket's lock is held.

use super::channel::Channel;
use crate::protocol::Frame;
use std::collections::HashMap;
use std::sync::Arc;

/// Named group of channels within one bucket
#[derive(Debug)]
pub struct Room {
    id: String,
    members: HashMap<String, Arc<Channel>>,
    /// Cluster-wide occupancy installed by the online loop, 0 until known
    all_online: i32,
}

impl Room {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: HashMap::new(),
            all_online: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a channel; returns false if its key was already a member
    pub fn join(&mut self, channel: Arc<Channel>) -> bool {
        self.members
            .insert(channel.key().to_string(), channel)
            .is_none()
    }

    /// Remove a channel if that very channel is the member under its key
    pub fn leave(&mut self, channel: &Arc<Channel>) -> bool {
        match self.members.get(channel.key()) {
            Some(member) if Arc::ptr_eq(member, channel) => {
                self.members.remove(channel.key());
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Local member count
    pub fn occupant_count(&self) -> i32 {
        self.members.len() as i32
    }

    /// Cluster-wide count when known, local count otherwise
    pub fn online(&self) -> i32 {
        if self.all_online > 0 {
            self.all_online
        } else {
            self.occupant_count()
        }
    }

    pub(crate) fn set_all_online(&mut self, count: i32) {
        self.all_online = count;
    }

    /// Enqueue `frame` to every member that accepts `op` on `platform`
    ///
    /// Never waits; members with a full queue miss the frame. Returns the
    /// number of members the frame was queued to.
    pub fn broadcast(&self, frame: &Frame, op: u32, platform: &str) -> usize {
        let mut delivered = 0;
        for channel in self.members.values() {
            if !channel.need_push(op, platform) {
                continue;
            }
            match channel.push(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        room_id = %self.id,
                        key = %channel.key(),
                        error = %e,
                        "room push dropped"
                    );
                }
            }
        }
        delivered
    }
}
