//! Test helpers for integration tests
//!
//! Provides a gateway bound to loopback ports, raw TCP and WebSocket clients
//! speaking the frame protocol, and JSON request helpers for the push RPC.

use crate::fixtures::{test_config, RecordingAuthority};
use anyhow::{bail, Result};
use bytes::BytesMut;
use comet_common::AppConfig;
use comet_gateway::protocol::{Frame, FrameCodec, OpCode};
use comet_gateway::{CometServer, Gateway};
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Default wait for anything the gateway should do promptly
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A running gateway with a recording authority
pub struct TestGateway {
    server: CometServer,
    pub authority: Arc<RecordingAuthority>,
    pub client: Client,
}

impl TestGateway {
    /// Start a gateway with [`test_config`]
    pub async fn start() -> Result<Self> {
        Self::start_with_config(test_config()).await
    }

    /// Start a gateway with custom config
    pub async fn start_with_config(config: AppConfig) -> Result<Self> {
        let authority = Arc::new(RecordingAuthority::new());
        let server = CometServer::start(config, authority.clone()).await?;
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            server,
            authority,
            client,
        })
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        self.server.gateway()
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.server.tcp_addrs()[0]
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/sub", self.server.ws_addrs()[0])
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.server.rpc_addr())
    }

    /// Open a raw TCP client
    pub async fn connect(&self) -> Result<TestClient> {
        TestClient::connect(self.tcp_addr()).await
    }

    /// Open a raw TCP client and authenticate it, returning the auth reply
    pub async fn connect_auth(&self, token: &str) -> Result<(TestClient, Frame)> {
        let mut client = self.connect().await?;
        let reply = client.auth(token).await?;
        Ok((client, reply))
    }

    /// Make a GET request against the push RPC
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Make a POST request with JSON body against the push RPC
    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.post(&url).json(body).send().await?)
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Raw TCP client speaking the frame protocol
pub struct TestClient {
    stream: TcpStream,
    codec: FrameCodec,
    buf: BytesMut,
    seq: u32,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            codec: FrameCodec::default(),
            buf: BytesMut::with_capacity(4096),
            seq: 0,
        })
    }

    /// Next sequence number
    pub fn next_seq(&mut self) -> u32 {
        self.seq += 1;
        self.seq
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        let mut out = BytesMut::new();
        self.codec.encode(frame, &mut out);
        self.stream.write_all(&out).await?;
        Ok(())
    }

    /// Send an op with a fresh sequence number, returning the number used
    pub async fn send_op(&mut self, op: impl Into<u32>, body: &[u8]) -> Result<u32> {
        let seq = self.next_seq();
        let frame = Frame::new(op, body.to_vec()).with_seq(seq);
        self.send(&frame).await?;
        Ok(seq)
    }

    /// Authenticate and wait for the reply
    pub async fn auth(&mut self, token: &str) -> Result<Frame> {
        let seq = self.send_op(OpCode::Auth, token.as_bytes()).await?;
        let reply = self.recv().await?;
        if reply.op != OpCode::AuthReply.as_u32() || reply.seq != seq {
            bail!("unexpected auth reply: op {} seq {}", reply.op, reply.seq);
        }
        Ok(reply)
    }

    /// Wait up to [`RECV_TIMEOUT`] for the next frame
    pub async fn recv(&mut self) -> Result<Frame> {
        match self.recv_timeout(RECV_TIMEOUT).await? {
            Some(frame) => Ok(frame),
            None => bail!("no frame within {RECV_TIMEOUT:?}"),
        }
    }

    /// Wait up to `timeout` for the next frame; `None` on timeout
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        match tokio::time::timeout(timeout, self.read_frame()).await {
            Ok(frame) => frame.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                bail!("connection closed");
            }
        }
    }

    /// Whether the server closes the connection within `timeout`
    pub async fn closed_within(&mut self, timeout: Duration) -> bool {
        let read = async {
            let mut scratch = [0u8; 256];
            loop {
                match self.stream.read(&mut scratch).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        };
        tokio::time::timeout(timeout, read).await.is_ok()
    }
}

/// WebSocket client speaking the frame protocol, one frame per message
pub struct TestWsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    codec: FrameCodec,
}

impl TestWsClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        Ok(Self {
            ws,
            codec: FrameCodec::default(),
        })
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        let mut out = BytesMut::new();
        self.codec.encode(frame, &mut out);
        self.ws.send(Message::Binary(out.to_vec())).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Frame> {
        match tokio::time::timeout(RECV_TIMEOUT, self.read_frame()).await {
            Ok(frame) => frame,
            Err(_) => bail!("no message within {RECV_TIMEOUT:?}"),
        }
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(self.codec.decode_message(&data)?),
                Some(Ok(Message::Close(_))) | None => bail!("connection closed"),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// Assert response status
pub async fn assert_status(response: Response, expected: StatusCode) -> Result<()> {
    let status = response.status();
    if status != expected {
        let body = response.text().await.unwrap_or_default();
        bail!("expected status {expected}, got {status}: {body}");
    }
    Ok(())
}

/// Assert status and parse the JSON body
pub async fn assert_json<T: DeserializeOwned>(response: Response, expected: StatusCode) -> Result<T> {
    let status = response.status();
    if status != expected {
        let body = response.text().await.unwrap_or_default();
        bail!("expected status {expected}, got {status}: {body}");
    }
    Ok(response.json().await?)
}
