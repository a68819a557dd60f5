//! Frame transports
//!
//! A connection is served through a [`FrameRead`] half owned by the reader
//! task and a [`FrameWrite`] half owned by the dispatcher. Writes are buffered
//! and only hit the socket on [`FrameWrite::flush`].

mod tcp;
mod websocket;

pub use tcp::{TcpFrameReader, TcpFrameWriter};
pub use websocket::{WsFrameReader, WsFrameWriter};

use crate::protocol::{Frame, FrameError};
use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Transport errors, all fatal to the connection
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("unsupported websocket message: {0}")]
    UnsupportedMessage(&'static str),

    #[error("connection closed by peer")]
    Closed,

    #[error("write timed out")]
    WriteTimeout,
}

impl TransportError {
    /// Peer-initiated shutdowns that are not worth an error log
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            Self::WebSocket(e) => matches!(
                e,
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
            ),
            _ => false,
        }
    }
}

/// Inbound half of a connection
#[async_trait]
pub trait FrameRead: Send {
    /// Read the next complete frame
    ///
    /// Cancel-safe: dropping the future loses no buffered bytes.
    async fn read_frame(&mut self) -> Result<Frame, TransportError>;
}

/// Outbound half of a connection
#[async_trait]
pub trait FrameWrite: Send {
    /// Buffer a frame
    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Buffer a heartbeat reply carrying the room occupant count
    fn write_heartbeat_reply(&mut self, frame: &Frame, online: i32) -> Result<(), TransportError>;

    /// Send everything buffered since the last flush
    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Close the write side
    async fn shutdown(&mut self);
}
