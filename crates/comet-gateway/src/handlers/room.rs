//! Change-room handler (op 12)

use super::{HandlerError, HandlerResult};
use crate::connection::{Bucket, Channel};
use crate::protocol::{Frame, OpCode};
use std::sync::Arc;

/// Moves a channel between rooms
pub struct RoomHandler;

impl RoomHandler {
    /// Body is the target room id; an empty body leaves the current room
    ///
    /// The reply echoes the room id.
    pub fn handle(bucket: &Bucket, channel: &Arc<Channel>, frame: &mut Frame) -> HandlerResult<()> {
        let room_id = std::str::from_utf8(&frame.body)
            .map_err(|_| HandlerError::InvalidPayload("room id is not UTF-8".to_string()))?
            .trim();

        let previous = channel.room_id();
        bucket.change_room(room_id, channel)?;
        frame.op = OpCode::ChangeRoomReply.as_u32();

        tracing::debug!(
            key = %channel.key(),
            from = previous.as_deref().unwrap_or(""),
            room_id = %room_id,
            "room changed"
        );
        Ok(())
    }
}
