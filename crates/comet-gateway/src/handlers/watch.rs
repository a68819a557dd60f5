//! Watch-set handlers (ops 14 and 16)

use crate::connection::Channel;
use crate::protocol::{Frame, OpCode};
use std::num::ParseIntError;

/// Parse a comma-separated op list, ignoring blanks
pub fn parse_ops(body: &[u8]) -> Result<Vec<u32>, ParseIntError> {
    String::from_utf8_lossy(body)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Registers and unregisters pushed ops
pub struct WatchHandler;

impl WatchHandler {
    /// Add the listed ops to the watch set
    pub fn register(channel: &Channel, frame: &mut Frame) {
        match parse_ops(&frame.body) {
            Ok(ops) => channel.watch(&ops),
            Err(e) => tracing::warn!(key = %channel.key(), error = %e, "malformed register body"),
        }
        frame.op = OpCode::RegisterReply.as_u32();
    }

    /// Remove the listed ops from the watch set
    pub fn unregister(channel: &Channel, frame: &mut Frame) {
        match parse_ops(&frame.body) {
            Ok(ops) => channel.unwatch(&ops),
            Err(e) => tracing::warn!(key = %channel.key(), error = %e, "malformed unregister body"),
        }
        frame.op = OpCode::UnregisterReply.as_u32();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelState, SessionInfo, StateCell};
    use std::sync::Arc;

    fn channel() -> Arc<Channel> {
        let info = SessionInfo {
            key: "k".to_string(),
            user_id: 1,
            platform: "pc".to_string(),
            ip: String::new(),
        };
        Channel::new(info, Arc::new(StateCell::new(ChannelState::Active)), 4, 4).0
    }

    #[test]
    fn test_parse_ops() {
        assert_eq!(parse_ops(b"4,5, 1001").unwrap(), vec![4, 5, 1001]);
        assert_eq!(parse_ops(b"").unwrap(), Vec::<u32>::new());
        assert!(parse_ops(b"4,x").is_err());
    }

    #[test]
    fn test_register_and_unregister() {
        let channel = channel();
        let mut frame = Frame::new(OpCode::Register, "4,5");
        WatchHandler::register(&channel, &mut frame);
        assert_eq!(frame.op, 15);
        assert_eq!(channel.watched_ops(), vec![4, 5]);

        let mut frame = Frame::new(OpCode::Unregister, "4");
        WatchHandler::unregister(&channel, &mut frame);
        assert_eq!(frame.op, 17);
        assert_eq!(channel.watched_ops(), vec![5]);
    }

    #[test]
    fn test_malformed_list_leaves_set_unchanged() {
        let channel = channel();
        channel.watch(&[4]);
        let mut frame = Frame::new(OpCode::Register, "5,oops");
        WatchHandler::register(&channel, &mut frame);

        assert_eq!(frame.op, 15);
        assert_eq!(channel.watched_ops(), vec![4]);
    }
}
