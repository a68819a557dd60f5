//! Test fixtures
//!
//! Configuration tuned for fast tests and an authority that records calls.

use async_trait::async_trait;
use comet_common::AppConfig;
use comet_gateway::authority::{
    Authority, AuthorityError, ConnectReply, ConnectRequest, TokenAuthority,
};
use comet_gateway::protocol::Frame;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Loopback config on ephemeral ports with short deadlines
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.tcp.bind = vec!["127.0.0.1:0".to_string()];
    config.tcp.accept = 1;
    config.websocket.bind = vec!["127.0.0.1:0".to_string()];
    config.rpc.bind = "127.0.0.1:0".to_string();
    config.bucket.size = 4;
    config.round.timer = 2;
    config.round.reader = 2;
    config.round.writer = 2;
    config.round.timer_tick_ms = 10;
    config.protocol.handshake_timeout_ms = 500;
    config.protocol.heartbeat_timeout_ms = 5_000;
    config.protocol.write_timeout_ms = 1_000;
    config.online.tick_secs = 3_600;
    config
}

/// `user_id|key|room_id|platform|accepts` token for the token authority
pub fn token(user_id: i64, key: &str, room_id: &str, platform: &str, accepts: &[u32]) -> String {
    let accepts: Vec<String> = accepts.iter().map(ToString::to_string).collect();
    format!("{user_id}|{key}|{room_id}|{platform}|{}", accepts.join(","))
}

/// A `disconnect` or `heartbeat` call as seen by the authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCall {
    pub user_id: i64,
    pub key: String,
    pub server_id: String,
}

/// A forwarded business frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub user_id: i64,
    pub op: u32,
    pub body: Vec<u8>,
}

/// Token authority that records every call it receives
#[derive(Debug, Default)]
pub struct RecordingAuthority {
    inner: TokenAuthority,
    connects: Mutex<Vec<ConnectRequest>>,
    disconnects: Mutex<Vec<SessionCall>>,
    heartbeats: Mutex<Vec<SessionCall>>,
    reports: Mutex<Vec<Report>>,
}

impl RecordingAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> Vec<ConnectRequest> {
        self.connects.lock().clone()
    }

    pub fn disconnects(&self) -> Vec<SessionCall> {
        self.disconnects.lock().clone()
    }

    pub fn heartbeats(&self) -> Vec<SessionCall> {
        self.heartbeats.lock().clone()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl Authority for RecordingAuthority {
    async fn connect(&self, request: ConnectRequest) -> Result<ConnectReply, AuthorityError> {
        self.connects.lock().push(request.clone());
        self.inner.connect(request).await
    }

    async fn disconnect(&self, user_id: i64, key: &str, server_id: &str) -> Result<(), AuthorityError> {
        self.disconnects.lock().push(SessionCall {
            user_id,
            key: key.to_string(),
            server_id: server_id.to_string(),
        });
        Ok(())
    }

    async fn heartbeat(&self, user_id: i64, key: &str, server_id: &str) -> Result<(), AuthorityError> {
        self.heartbeats.lock().push(SessionCall {
            user_id,
            key: key.to_string(),
            server_id: server_id.to_string(),
        });
        Ok(())
    }

    async fn renew_online(
        &self,
        server_id: &str,
        room_counts: HashMap<String, i32>,
    ) -> Result<HashMap<String, i32>, AuthorityError> {
        self.inner.renew_online(server_id, room_counts).await
    }

    async fn report(&self, user_id: i64, frame: &Frame) -> Result<(), AuthorityError> {
        self.reports.lock().push(Report {
            user_id,
            op: frame.op,
            body: frame.body.to_vec(),
        });
        Ok(())
    }
}
