//! Business frame handler (ops 1000..=10000)

use super::HandlerResult;
use crate::connection::Channel;
use crate::protocol::Frame;
use crate::server::Gateway;
use bytes::Bytes;

/// Forwards application traffic to the authority
pub struct ReportHandler;

impl ReportHandler {
    /// Report the frame, then clear its body so only the header is echoed
    pub async fn handle(gateway: &Gateway, channel: &Channel, frame: &mut Frame) -> HandlerResult<()> {
        gateway.authority().report(channel.user_id(), frame).await?;
        frame.body = Bytes::new();
        Ok(())
    }
}
