//! Integration test utilities for the comet gateway
//!
//! This crate provides helpers for running end-to-end tests against real
//! loopback listeners: raw TCP and WebSocket clients, the push RPC surface and
//! an authority that records what the gateway told it.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
