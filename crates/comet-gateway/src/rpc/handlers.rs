//! Push RPC handlers

use super::response::{RpcError, RpcResult};
use crate::protocol::{Frame, PROTOCOL_VERSION};
use crate::server::Gateway;
use axum::{extract::State, http::StatusCode, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Frame as carried in RPC bodies; `body` is base64
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FramePayload {
    #[serde(default = "default_ver")]
    pub ver: u16,
    pub op: u32,
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub body: String,
}

fn default_ver() -> u16 {
    PROTOCOL_VERSION
}

impl FramePayload {
    pub fn into_frame(self) -> Result<Frame, RpcError> {
        let body = STANDARD
            .decode(self.body.as_bytes())
            .map_err(|e| RpcError::invalid_input(format!("frame body is not base64: {e}")))?;
        Ok(Frame {
            ver: self.ver,
            op: self.op,
            seq: self.seq,
            body: body.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PushKeysRequest {
    pub keys: Vec<String>,
    pub op: u32,
    pub frame: FramePayload,
}

#[derive(Debug, Serialize)]
pub struct PushKeysResponse {
    pub pushed: usize,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub op: u32,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub speed: u32,
    pub frame: FramePayload,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub accepted: bool,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRoomRequest {
    pub room_id: String,
    pub frame: FramePayload,
}

#[derive(Debug, Serialize)]
pub struct BroadcastRoomResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub server_id: String,
    pub channels: usize,
    pub rooms: usize,
    pub outstanding_buffers: usize,
    pub pending_timers: usize,
}

/// Push a frame to specific connection keys
///
/// POST /push/keys
pub async fn push_keys(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<PushKeysRequest>,
) -> RpcResult<Json<PushKeysResponse>> {
    let frame = request.frame.into_frame()?;
    let pushed = gateway.push_keys(&request.keys, &frame, request.op)?;
    Ok(Json(PushKeysResponse { pushed }))
}

/// Push a frame to every connection, paced in the background
///
/// POST /broadcast
pub async fn broadcast(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<BroadcastRequest>,
) -> RpcResult<(StatusCode, Json<BroadcastResponse>)> {
    let frame = request.frame.into_frame()?;
    // detached; the task logs its own delivery count
    drop(gateway.broadcast(frame, request.op, request.platform, request.speed));
    Ok((StatusCode::ACCEPTED, Json(BroadcastResponse { accepted: true })))
}

/// Push a frame to one room
///
/// POST /broadcast/room
pub async fn broadcast_room(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<BroadcastRoomRequest>,
) -> RpcResult<Json<BroadcastRoomResponse>> {
    if request.room_id.is_empty() {
        return Err(RpcError::invalid_input("room_id must not be empty"));
    }
    let frame = request.frame.into_frame()?;
    let delivered = gateway.broadcast_room(&request.room_id, &frame);
    Ok(Json(BroadcastRoomResponse { delivered }))
}

/// Rooms with at least one local member
///
/// GET /rooms
pub async fn rooms(State(gateway): State<Arc<Gateway>>) -> Json<RoomsResponse> {
    Json(RoomsResponse {
        rooms: gateway.room_ids().into_iter().collect(),
    })
}

/// GET /stats
pub async fn stats(State(gateway): State<Arc<Gateway>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        server_id: gateway.server_id().to_string(),
        channels: gateway.channel_count(),
        rooms: gateway.room_ids().len(),
        outstanding_buffers: gateway.round().outstanding_buffers(),
        pending_timers: gateway.round().pending_timers(),
    })
}

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}
