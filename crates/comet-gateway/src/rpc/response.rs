//! Error responses for the push RPC surface

use crate::error::GatewayError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use comet_common::{AppError, ErrorResponse};
use serde::Serialize;

/// RPC error, rendered as `{"error": {"code", "message"}}`
#[derive(Debug)]
pub struct RpcError(pub AppError);

impl RpcError {
    pub fn invalid_input(msg: impl std::fmt::Display) -> Self {
        Self(AppError::invalid_input(msg))
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<GatewayError> for RpcError {
    fn from(err: GatewayError) -> Self {
        Self(err.into())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorResponse,
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "push rpc failed");
        }

        let body = ErrorBody {
            error: ErrorResponse::from(&self.0),
        };
        (status, Json(body)).into_response()
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
