//! Response envelopes shared by the gateway REST front ends
//!
//! A reply is either `{"success": true, "data": .., "status": ..}` or
//! `{"success": false, "error": {..}}`. The `status` member carries the
//! serialized outcome of the device operation that produced `data`.

use serde::{Deserialize, Serialize};

pub use errors::ErrorInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
    /// Outcome of the device operation, absent for local-only endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            status: None,
        }
    }

    /// Attach an operation status; a status that fails to serialize is dropped
    pub fn with_status(mut self, status: &impl Serialize) -> Self {
        self.status = serde_json::to_value(status).ok();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Error reply with its HTTP status; handlers return it through `?`
#[cfg(feature = "axum")]
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ErrorInfo,
}

#[cfg(feature = "axum")]
impl AppError {
    /// Unknown or out-of-range codes become 500
    pub fn from_code(code: u16, message: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            error: ErrorInfo::new(message).with_code(status.as_u16()),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from_code(400, message)
    }

    /// A failed device operation: `message` is the full status text and
    /// `name` the symbolic status, reported as the error details
    pub fn device_status(code: u16, name: &str, message: impl Into<String>) -> Self {
        let mut err = Self::from_code(code, message);
        err.error = err.error.with_details(name);
        err
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.error,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(feature = "axum")]
impl From<errors::GatewayError> for AppError {
    fn from(err: errors::GatewayError) -> Self {
        let error = err.to_error_info();
        let status = StatusCode::from_u16(error.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }
}
