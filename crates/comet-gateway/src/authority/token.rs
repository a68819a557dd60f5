//! In-process authority
//!
//! Trusts a self-describing token of the form
//! `user_id|key|room_id|platform|accepts`, where `accepts` is a
//! comma-separated op list. Meant for development and tests; occupancy is
//! aggregated across every server that reported to this instance.

use super::{Authority, AuthorityError, ConnectReply, ConnectRequest};
use crate::protocol::Frame;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Authority that parses tokens locally
#[derive(Debug, Default)]
pub struct TokenAuthority {
    online: Mutex<HashMap<String, HashMap<String, i32>>>,
}

impl TokenAuthority {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `user_id|key|room_id|platform|accepts` token
    pub fn parse_token(token: &str) -> Result<ConnectReply, AuthorityError> {
        let parts: Vec<&str> = token.trim().split('|').collect();
        let [user_id, key, room_id, platform, accepts] = parts[..] else {
            return Err(AuthorityError::Rejected(format!("invalid token: {token}")));
        };

        let user_id = user_id
            .parse()
            .map_err(|_| AuthorityError::Rejected(format!("invalid user id: {user_id}")))?;
        if key.is_empty() {
            return Err(AuthorityError::Rejected("empty key".to_string()));
        }
        let accepts = accepts
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| AuthorityError::Rejected(format!("invalid accepts: {accepts}")))?;

        Ok(ConnectReply {
            user_id,
            key: key.to_string(),
            room_id: room_id.to_string(),
            platform: platform.to_string(),
            accepts,
        })
    }
}

#[async_trait]
impl Authority for TokenAuthority {
    async fn connect(&self, request: ConnectRequest) -> Result<ConnectReply, AuthorityError> {
        let reply = Self::parse_token(&request.token)?;
        tracing::info!(
            key = %reply.key,
            user_id = reply.user_id,
            server_id = %request.server_id,
            "connection authenticated"
        );
        Ok(reply)
    }

    async fn disconnect(
        &self,
        user_id: i64,
        key: &str,
        server_id: &str,
    ) -> Result<(), AuthorityError> {
        tracing::info!(key = %key, user_id, server_id = %server_id, "connection disconnected");
        Ok(())
    }

    async fn heartbeat(&self, user_id: i64, key: &str, server_id: &str) -> Result<(), AuthorityError> {
        tracing::debug!(key = %key, user_id, server_id = %server_id, "connection heartbeat");
        Ok(())
    }

    async fn renew_online(
        &self,
        server_id: &str,
        room_counts: HashMap<String, i32>,
    ) -> Result<HashMap<String, i32>, AuthorityError> {
        let mut online = self.online.lock();
        online.insert(server_id.to_string(), room_counts);

        let mut totals: HashMap<String, i32> = HashMap::new();
        for rooms in online.values() {
            for (room_id, count) in rooms {
                *totals.entry(room_id.clone()).or_default() += count;
            }
        }
        Ok(totals)
    }

    async fn report(&self, user_id: i64, frame: &Frame) -> Result<(), AuthorityError> {
        tracing::debug!(user_id, op = frame.op, len = frame.body.len(), "business frame reported");
        Ok(())
    }
}
