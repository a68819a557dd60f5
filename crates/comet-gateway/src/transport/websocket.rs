//! WebSocket transport, one binary message per frame

use super::{FrameRead, FrameWrite, TransportError};
use crate::protocol::{Frame, FrameCodec, OpCode};
use crate::round::PooledBuf;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Reads one frame per binary message
pub struct WsFrameReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    codec: FrameCodec,
}

impl<S> WsFrameReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: SplitStream<WebSocketStream<S>>, codec: FrameCodec) -> Self {
        Self { stream, codec }
    }
}

#[async_trait]
impl<S> FrameRead for WsFrameReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(self.codec.decode_message(&data)?),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Text(_))) => {
                    return Err(TransportError::UnsupportedMessage("text"));
                }
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Encodes each frame into its own binary message
pub struct WsFrameWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    codec: FrameCodec,
    buf: PooledBuf,
    pending: Vec<Message>,
}

impl<S> WsFrameWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        sink: SplitSink<WebSocketStream<S>, Message>,
        codec: FrameCodec,
        buf: PooledBuf,
    ) -> Self {
        Self {
            sink,
            codec,
            buf,
            pending: Vec::new(),
        }
    }

    fn take_message(&mut self) {
        if !self.buf.is_empty() {
            self.pending.push(Message::Binary(self.buf.to_vec()));
            self.buf.clear();
        }
    }
}

#[async_trait]
impl<S> FrameWrite for WsFrameWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if frame.op == OpCode::Raw.as_u32() {
            // a raw body is a run of encoded frames, each gets its own message
            for chunk in FrameCodec::split_raw(&frame.body) {
                self.pending.push(Message::Binary(chunk.to_vec()));
            }
            return Ok(());
        }
        self.codec.encode(frame, &mut self.buf);
        self.take_message();
        Ok(())
    }

    fn write_heartbeat_reply(&mut self, frame: &Frame, online: i32) -> Result<(), TransportError> {
        self.codec.encode_heartbeat_reply(frame, online, &mut self.buf);
        self.take_message();
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        for message in self.pending.drain(..) {
            self.sink.feed(message).await?;
        }
        self.sink.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) {
        let _ = self.sink.close().await;
    }
}
