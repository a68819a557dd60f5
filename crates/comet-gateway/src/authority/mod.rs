//! Authority tier client
//!
//! The authority authenticates connections, tracks which server holds which
//! key and aggregates room occupancy across the cluster. The gateway only
//! talks to it through the [`Authority`] trait.

mod http;
mod token;

pub use http::HttpAuthority;
pub use token::TokenAuthority;

use crate::protocol::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Authority call errors
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The authority refused the request (bad token, unknown key)
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("authority unavailable: {0}")]
    Unavailable(String),

    #[error("authority call timed out")]
    Timeout,

    #[error("malformed authority response: {0}")]
    Protocol(String),
}

impl From<AuthorityError> for comet_common::AppError {
    fn from(err: AuthorityError) -> Self {
        Self::Authority(err.to_string())
    }
}

/// Handshake request forwarded to [`Authority::connect`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub server_id: String,
    pub server_key: String,
    pub cookie: String,
    pub token: String,
}

/// Session identity granted by the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReply {
    pub user_id: i64,
    pub key: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub accepts: Vec<u32>,
}

/// Upstream authority operations
#[async_trait]
pub trait Authority: Send + Sync + 'static {
    /// Authenticate a handshake token
    async fn connect(&self, request: ConnectRequest) -> Result<ConnectReply, AuthorityError>;

    /// Forget a session
    async fn disconnect(&self, user_id: i64, key: &str, server_id: &str)
        -> Result<(), AuthorityError>;

    /// Renew the liveness of a session
    async fn heartbeat(&self, user_id: i64, key: &str, server_id: &str)
        -> Result<(), AuthorityError>;

    /// Report local room counts, receive cluster-wide counts
    async fn renew_online(
        &self,
        server_id: &str,
        room_counts: HashMap<String, i32>,
    ) -> Result<HashMap<String, i32>, AuthorityError>;

    /// Forward a business frame
    async fn report(&self, user_id: i64, frame: &Frame) -> Result<(), AuthorityError>;
}
