//! Op code handlers
//!
//! Processes frames read from an active connection. Each handler rewrites the
//! frame in place into the reply the dispatcher will write back.

mod error;
mod heartbeat;
mod report;
mod room;
mod watch;

pub use error::{HandlerError, HandlerResult};
pub use heartbeat::{HeartbeatHandler, LivenessRenewal};
pub use report::ReportHandler;
pub use room::RoomHandler;
pub use watch::{parse_ops, WatchHandler};

use crate::connection::{Bucket, Channel};
use crate::protocol::{Frame, OpCode};
use crate::server::Gateway;
use std::sync::Arc;

/// Routes non-heartbeat client frames to their handler
pub struct OperationRouter;

impl OperationRouter {
    /// Process one client frame
    pub async fn dispatch(
        gateway: &Gateway,
        bucket: &Bucket,
        channel: &Arc<Channel>,
        frame: &mut Frame,
    ) -> HandlerResult<()> {
        if OpCode::is_business(frame.op) {
            return ReportHandler::handle(gateway, channel, frame).await;
        }

        match OpCode::from_u32(frame.op) {
            Some(OpCode::ChangeRoom) => RoomHandler::handle(bucket, channel, frame),
            Some(OpCode::Register) => {
                WatchHandler::register(channel, frame);
                Ok(())
            }
            Some(OpCode::Unregister) => {
                WatchHandler::unregister(channel, frame);
                Ok(())
            }
            _ => Err(HandlerError::UnknownOperation(frame.op)),
        }
    }
}
