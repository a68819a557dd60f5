//! # comet-gateway
//!
//! Long-lived connection gateway. Clients connect over raw TCP or WebSocket,
//! authenticate through the authority tier and are then reachable by key,
//! by room or by broadcast through the push RPC surface.

pub mod authority;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod hash;
pub mod protocol;
pub mod round;
pub mod rpc;
pub mod server;
pub mod transport;

pub use error::GatewayError;
pub use server::{run, CometServer, Gateway};
