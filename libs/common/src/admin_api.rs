//! Shared admin endpoints
//!
//! Runtime log level inspection and change, mounted by every gateway server
//! under `/api/admin/logs/level`.

use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::api_types::{AppError, SuccessResponse};
use crate::logging;

/// Current log filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
}

/// Request body for changing the log filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLogLevelRequest {
    /// Plain level ("debug") or full filter directive ("info,etapu11=trace")
    pub level: String,
}

/// GET handler: current log filter
pub async fn get_log_level() -> Json<SuccessResponse<LogLevelResponse>> {
    Json(SuccessResponse::new(LogLevelResponse {
        level: logging::get_log_level(),
    }))
}

/// PUT handler: replace the log filter
pub async fn set_log_level(
    Json(request): Json<SetLogLevelRequest>,
) -> Result<Json<SuccessResponse<LogLevelResponse>>, AppError> {
    logging::set_log_level(&request.level).map_err(AppError::bad_request)?;
    Ok(Json(SuccessResponse::new(LogLevelResponse {
        level: logging::get_log_level(),
    })))
}
