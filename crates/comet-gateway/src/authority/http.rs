//! HTTP/JSON authority client

use super::{Authority, AuthorityError, ConnectReply, ConnectRequest};
use crate::protocol::Frame;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    user_id: i64,
    key: &'a str,
    server_id: &'a str,
}

#[derive(Debug, Serialize)]
struct OnlineRequest<'a> {
    server_id: &'a str,
    room_counts: &'a HashMap<String, i32>,
}

#[derive(Debug, Deserialize)]
struct OnlineReply {
    #[serde(default)]
    room_counts: HashMap<String, i32>,
}

#[derive(Debug, Serialize)]
struct ReportRequest {
    user_id: i64,
    ver: u16,
    op: u32,
    seq: u32,
    body: String,
}

/// Authority reached over HTTP
///
/// Every call is a `POST` of a JSON body to `{base_url}/{endpoint}`; any
/// non-2xx status is an error.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: String,
}

impl HttpAuthority {
    /// Build a client with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthorityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorityError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<reqwest::Response, AuthorityError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            Err(AuthorityError::Rejected(format!("{status}: {text}")))
        } else {
            Err(AuthorityError::Unavailable(format!("{status}: {text}")))
        }
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R, AuthorityError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.post(endpoint, body)
            .await?
            .json()
            .await
            .map_err(|e| AuthorityError::Protocol(e.to_string()))
    }
}

fn map_transport_error(err: reqwest::Error) -> AuthorityError {
    if err.is_timeout() {
        AuthorityError::Timeout
    } else {
        AuthorityError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn connect(&self, request: ConnectRequest) -> Result<ConnectReply, AuthorityError> {
        self.post_json("connect", &request).await
    }

    async fn disconnect(
        &self,
        user_id: i64,
        key: &str,
        server_id: &str,
    ) -> Result<(), AuthorityError> {
        let body = SessionRequest {
            user_id,
            key,
            server_id,
        };
        self.post("disconnect", &body).await.map(drop)
    }

    async fn heartbeat(&self, user_id: i64, key: &str, server_id: &str) -> Result<(), AuthorityError> {
        let body = SessionRequest {
            user_id,
            key,
            server_id,
        };
        self.post("heartbeat", &body).await.map(drop)
    }

    async fn renew_online(
        &self,
        server_id: &str,
        room_counts: HashMap<String, i32>,
    ) -> Result<HashMap<String, i32>, AuthorityError> {
        let body = OnlineRequest {
            server_id,
            room_counts: &room_counts,
        };
        let reply: OnlineReply = self.post_json("online", &body).await?;
        Ok(reply.room_counts)
    }

    async fn report(&self, user_id: i64, frame: &Frame) -> Result<(), AuthorityError> {
        let body = ReportRequest {
            user_id,
            ver: frame.ver,
            op: frame.op,
            seq: frame.seq,
            body: BASE64.encode(&frame.body),
        };
        self.post("report", &body).await.map(drop)
    }
}
