//! REST API
//!
//! Every read endpoint performs the gateway operation first and answers with
//! the refreshed data. The operation status travels in the response `status`;
//! a Bad status becomes an HTTP error.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use common::admin_api;
use common::{AppError, SuccessResponse};
use gateway_core::{DataStatus, RegisterTransport};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::gateway::EtaPU11Gateway;
use crate::registers::Subsystem;

type ApiResult = Result<Json<SuccessResponse<Value>>, AppError>;

/// Create all API routes with state
pub fn create_routes<T: RegisterTransport + 'static>(gateway: Arc<EtaPU11Gateway<T>>) -> Router {
    Router::new()
        .route("/health", get(health_check::<T>))
        .route("/api/etapu11", get(read_all::<T>))
        .route(
            "/api/etapu11/property/{name}",
            get(read_property::<T>).put(write_property::<T>),
        )
        .route("/api/etapu11/{subsystem}", get(read_subsystem::<T>))
        .route(
            "/api/admin/logs/level",
            get(admin_api::get_log_level).put(admin_api::set_log_level),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Wrap data in the envelope, or turn a Bad status into an HTTP error
pub fn respond(status: DataStatus, data: Value) -> ApiResult {
    if status.is_bad() {
        return Err(AppError::device_status(
            status.http_status(),
            status.name(),
            status.to_string(),
        ));
    }
    Ok(Json(SuccessResponse::new(data).with_status(&status)))
}

/// Accept `"21:00:00"`, `21.5` or `true` as the new value
fn value_text(body: &Value) -> Result<String, AppError> {
    match body {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(AppError::bad_request(format!(
            "expected a JSON string, number or boolean, got {}",
            other
        ))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check<T: RegisterTransport + 'static>(
    State(gateway): State<Arc<EtaPU11Gateway<T>>>,
) -> Json<SuccessResponse<Value>> {
    Json(SuccessResponse::new(json!({
        "status": "healthy",
        "service": "etapu11",
        "startup_ok": gateway.is_startup_ok(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn read_all<T: RegisterTransport + 'static>(
    State(gateway): State<Arc<EtaPU11Gateway<T>>>,
) -> ApiResult {
    let status = gateway.read_all().await;
    let data = serde_json::to_value(gateway.data()).map_err(errors::GatewayError::from)?;
    respond(status, data)
}

async fn read_subsystem<T: RegisterTransport + 'static>(
    State(gateway): State<Arc<EtaPU11Gateway<T>>>,
    Path(subsystem): Path<String>,
) -> ApiResult {
    let subsystem: Subsystem = subsystem.parse()?;
    let status = gateway.read_subsystem(subsystem).await;
    let data = gateway
        .data()
        .subsystem_json(subsystem)
        .map_err(errors::GatewayError::from)?;
    respond(status, data)
}

async fn read_property<T: RegisterTransport + 'static>(
    State(gateway): State<Arc<EtaPU11Gateway<T>>>,
    Path(name): Path<String>,
) -> ApiResult {
    let status = gateway.read_property(&name).await;
    let value = gateway.value(&name).map(|v| v.to_json()).unwrap_or(Value::Null);
    respond(status, json!({ name: value }))
}

async fn write_property<T: RegisterTransport + 'static>(
    State(gateway): State<Arc<EtaPU11Gateway<T>>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    let text = value_text(&body)?;
    debug!("PUT {} = {}", name, text);
    let status = gateway.write_property(&name, &text).await;
    let value = gateway.value(&name).map(|v| v.to_json()).unwrap_or(Value::Null);
    respond(status, json!({ name: value }))
}
