//! Push RPC surface
//!
//! HTTP/JSON endpoints used by the dispatch tier to deliver frames to the
//! connections held by this server.

mod handlers;
mod response;

pub use handlers::{
    BroadcastRequest, BroadcastRoomRequest, FramePayload, PushKeysRequest, StatsResponse,
};
pub use response::{ErrorBody, RpcError, RpcResult};

use crate::server::Gateway;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the push router
pub fn create_router() -> Router<Arc<Gateway>> {
    Router::new()
        .route("/push/keys", post(handlers::push_keys))
        .route("/broadcast", post(handlers::broadcast))
        .route("/broadcast/room", post(handlers::broadcast_room))
        .route("/rooms", get(handlers::rooms))
        .route("/stats", get(handlers::stats))
        .route("/health", get(handlers::health_check))
}

/// Build the complete RPC application
pub fn create_app(gateway: Arc<Gateway>) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}
