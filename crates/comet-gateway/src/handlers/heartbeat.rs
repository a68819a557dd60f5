//! Heartbeat handler (op 2)

use crate::connection::Channel;
use crate::protocol::{Frame, OpCode};
use crate::server::Gateway;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tracks when the authority was last told a session is alive
#[derive(Debug)]
pub struct LivenessRenewal {
    interval: Duration,
    last: Instant,
}

impl LivenessRenewal {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Returns true at most once per interval
    pub fn due(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last) > self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Handles client keepalives
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Turn the frame into a heartbeat reply and renew liveness when due
    ///
    /// The occupant count is filled in by the dispatcher at write time.
    pub fn handle(
        gateway: &Arc<Gateway>,
        channel: &Arc<Channel>,
        frame: &mut Frame,
        renewal: &mut LivenessRenewal,
    ) {
        frame.reply(OpCode::HeartbeatReply);

        if renewal.due(Instant::now()) {
            let gateway = Arc::clone(gateway);
            let user_id = channel.user_id();
            let key = channel.key().to_string();
            tokio::spawn(async move {
                if let Err(e) = gateway.heartbeat(user_id, &key).await {
                    tracing::warn!(key = %key, user_id, error = %e, "liveness renewal failed");
                }
            });
        }

        tracing::trace!(key = %channel.key(), seq = frame.seq, "heartbeat received");
    }
}
