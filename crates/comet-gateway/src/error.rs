//! Gateway error type

use crate::authority::AuthorityError;
use crate::connection::{BucketError, RingError};
use crate::handlers::HandlerError;
use crate::transport::TransportError;
use comet_common::AppError;
use thiserror::Error;

/// Errors that end a connection or fail a push call
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Registry(#[from] BucketError),

    #[error(transparent)]
    Ring(#[from] RingError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The connection's deadline fired or its dispatcher failed
    #[error("connection closed by server")]
    Closed,

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl GatewayError {
    /// Ordinary end of a connection, logged at debug level only
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_disconnect(),
            _ => false,
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidArgument(msg) => Self::InvalidInput(msg),
            GatewayError::Authority(e) => e.into(),
            other => Self::internal(other),
        }
    }
}
