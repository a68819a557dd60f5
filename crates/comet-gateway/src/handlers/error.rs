//! Handler error types

use crate::authority::AuthorityError;
use crate::connection::BucketError;
use thiserror::Error;

/// Errors raised while processing a client frame
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Op is neither reserved nor in the business range
    #[error("unknown operation {0}")]
    UnknownOperation(u32),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Business frame could not be forwarded
    #[error("report failed: {0}")]
    Report(#[from] AuthorityError),

    #[error("registry error: {0}")]
    Registry(#[from] BucketError),
}

impl HandlerError {
    /// Whether the connection must be closed
    ///
    /// A channel missing from its bucket has already been evicted; everything
    /// else only costs the offending frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Registry(BucketError::NotRegistered(_)))
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
