//! Raw TCP transport

use super::{FrameRead, FrameWrite, TransportError};
use crate::protocol::{Frame, FrameCodec};
use crate::round::PooledBuf;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Decodes frames from a byte stream into a pooled read buffer
#[derive(Debug)]
pub struct TcpFrameReader<R> {
    inner: R,
    codec: FrameCodec,
    buf: PooledBuf,
}

impl<R> TcpFrameReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(inner: R, codec: FrameCodec, buf: PooledBuf) -> Self {
        Self { inner, codec, buf }
    }
}

#[async_trait]
impl<R> FrameRead for TcpFrameReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return Ok(frame);
            }
            if self.inner.read_buf(&mut *self.buf).await? == 0 {
                return Err(TransportError::Closed);
            }
        }
    }
}

/// Encodes frames into a pooled write buffer
#[derive(Debug)]
pub struct TcpFrameWriter<W> {
    inner: W,
    codec: FrameCodec,
    buf: PooledBuf,
}

impl<W> TcpFrameWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(inner: W, codec: FrameCodec, buf: PooledBuf) -> Self {
        Self { inner, codec, buf }
    }
}

#[async_trait]
impl<W> FrameWrite for TcpFrameWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.codec.encode(frame, &mut self.buf);
        Ok(())
    }

    fn write_heartbeat_reply(&mut self, frame: &Frame, online: i32) -> Result<(), TransportError> {
        self.codec.encode_heartbeat_reply(frame, online, &mut self.buf);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf).await?;
            self.buf.clear();
        }
        self.inner.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}
