//! TCP and WebSocket accept loops

use super::handler::{serve_connection, PeerInfo};
use super::Gateway;
use crate::transport::{TcpFrameReader, TcpFrameWriter, WsFrameReader, WsFrameWriter};
use comet_common::{AppError, TcpConfig};
use futures_util::StreamExt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Pause after a failed accept, typically descriptor exhaustion
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

const LISTEN_BACKLOG: u32 = 1024;

/// Bind a listener with the configured socket buffer sizes
pub fn bind_tcp(addr: &str, config: &TcpConfig) -> Result<TcpListener, AppError> {
    let parsed: SocketAddr = addr
        .parse()
        .map_err(|e| AppError::bind(addr, io::Error::new(io::ErrorKind::InvalidInput, e)))?;

    let socket = if parsed.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| AppError::bind(addr, e))?;

    socket.set_reuseaddr(true).map_err(|e| AppError::bind(addr, e))?;
    socket
        .set_send_buffer_size(config.sndbuf)
        .map_err(|e| AppError::bind(addr, e))?;
    socket
        .set_recv_buffer_size(config.rcvbuf)
        .map_err(|e| AppError::bind(addr, e))?;
    socket.bind(parsed).map_err(|e| AppError::bind(addr, e))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| AppError::bind(addr, e))
}

/// Run `accept` loops over a raw TCP listener
pub fn serve_tcp(gateway: Arc<Gateway>, listener: TcpListener, accept: usize) -> Vec<JoinHandle<()>> {
    let listener = Arc::new(listener);
    (0..accept.max(1))
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            let listener = Arc::clone(&listener);
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, remote)) => spawn_tcp(&gateway, stream, remote),
                        Err(e) => {
                            tracing::error!(error = %e, "tcp accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            })
        })
        .collect()
}

fn spawn_tcp(gateway: &Arc<Gateway>, stream: TcpStream, remote: SocketAddr) {
    if let Err(e) = stream.set_nodelay(gateway.config().tcp.nodelay) {
        tracing::warn!(remote = %remote, error = %e, "set_nodelay failed");
    }

    let slot = gateway.next_slot();
    let codec = gateway.codec();
    let (read_half, write_half) = stream.into_split();
    let reader = TcpFrameReader::new(read_half, codec, gateway.round().reader(slot).get());
    let writer = TcpFrameWriter::new(write_half, codec, gateway.round().writer(slot).get());
    let peer = PeerInfo {
        remote,
        cookie: String::new(),
        slot,
    };

    tracing::debug!(remote = %remote, slot, "tcp connection accepted");
    tokio::spawn(serve_connection(Arc::clone(gateway), reader, writer, peer));
}

/// Run `accept` loops over a WebSocket listener
///
/// Each accepted socket completes its upgrade inside its own task, bounded by
/// the handshake timeout.
pub fn serve_websocket(
    gateway: Arc<Gateway>,
    listener: TcpListener,
    accept: usize,
) -> Vec<JoinHandle<()>> {
    let listener = Arc::new(listener);
    (0..accept.max(1))
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            let listener = Arc::clone(&listener);
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, remote)) => {
                            tokio::spawn(upgrade(Arc::clone(&gateway), stream, remote));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "websocket accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            })
        })
        .collect()
}

async fn upgrade(gateway: Arc<Gateway>, stream: TcpStream, remote: SocketAddr) {
    if let Err(e) = stream.set_nodelay(gateway.config().tcp.nodelay) {
        tracing::warn!(remote = %remote, error = %e, "set_nodelay failed");
    }

    let mut cookie = String::new();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if let Some(value) = request
            .headers()
            .get("cookie")
            .and_then(|v| v.to_str().ok())
        {
            cookie = value.to_string();
        }
        Ok(response)
    };

    let timeout = gateway.config().protocol.handshake_timeout();
    let ws = match tokio::time::timeout(timeout, tokio_tungstenite::accept_hdr_async(stream, callback)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::debug!(remote = %remote, error = %e, "websocket upgrade failed");
            return;
        }
        Err(_) => {
            tracing::debug!(remote = %remote, "websocket upgrade timed out");
            return;
        }
    };

    let slot = gateway.next_slot();
    let codec = gateway.codec();
    let (sink, stream) = ws.split();
    let reader = WsFrameReader::new(stream, codec);
    let writer = WsFrameWriter::new(sink, codec, gateway.round().writer(slot).get());
    let peer = PeerInfo {
        remote,
        cookie,
        slot,
    };

    tracing::debug!(remote = %remote, slot, "websocket connection accepted");
    serve_connection(gateway, reader, writer, peer).await;
}
