//! REST API
//!
//! Same shape as the other gateways: the read runs first, the refreshed view
//! is returned and the operation status rides in the `status` member.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use common::admin_api;
use common::{AppError, SuccessResponse};
use errors::GatewayError;
use gateway_core::{DataStatus, DatagramTransport};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::fields::Report;
use crate::gateway::WallboxGateway;

type ApiResult = Result<Json<SuccessResponse<Value>>, AppError>;

/// Create all API routes with state
pub fn create_routes<T: DatagramTransport + 'static>(gateway: Arc<WallboxGateway<T>>) -> Router {
    Router::new()
        .route("/health", get(health_check::<T>))
        .route("/api/wallbox", get(read_all::<T>))
        .route(
            "/api/wallbox/property/{name}",
            get(read_property::<T>).put(write_property::<T>),
        )
        .route("/api/wallbox/{report}", get(read_report::<T>))
        .route(
            "/api/admin/logs/level",
            get(admin_api::get_log_level).put(admin_api::set_log_level),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

fn respond(status: DataStatus, data: Value) -> ApiResult {
    if status.is_bad() {
        return Err(AppError::device_status(
            status.http_status(),
            status.name(),
            status.to_string(),
        ));
    }
    Ok(Json(SuccessResponse::new(data).with_status(&status)))
}

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

async fn health_check<T: DatagramTransport + 'static>(
    State(gateway): State<Arc<WallboxGateway<T>>>,
) -> Json<SuccessResponse<Value>> {
    Json(SuccessResponse::new(json!({
        "status": "healthy",
        "service": "wallbox",
        "startup_ok": gateway.is_startup_ok(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn read_all<T: DatagramTransport + 'static>(
    State(gateway): State<Arc<WallboxGateway<T>>>,
) -> ApiResult {
    let status = gateway.read_all().await;
    let data = serde_json::to_value(gateway.data()).map_err(GatewayError::from)?;
    respond(status, data)
}

async fn read_report<T: DatagramTransport + 'static>(
    State(gateway): State<Arc<WallboxGateway<T>>>,
    Path(report): Path<String>,
) -> ApiResult {
    let report: Report = report.parse()?;
    let status = gateway.read_report(report).await;
    let data = gateway
        .data()
        .report_json(report)
        .map_err(GatewayError::from)?;
    respond(status, data)
}

async fn read_property<T: DatagramTransport + 'static>(
    State(gateway): State<Arc<WallboxGateway<T>>>,
    Path(name): Path<String>,
) -> ApiResult {
    let status = gateway.read_property(&name).await;
    let value = gateway.value(&name).map(|v| v.to_json()).unwrap_or(Value::Null);
    respond(status, json!({ name: value }))
}

async fn write_property<T: DatagramTransport + 'static>(
    State(gateway): State<Arc<WallboxGateway<T>>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    let text = value_text(&body)?;
    debug!("PUT {} = {}", name, text);
    let status = gateway.write_property(&name, &text).await;
    let value = gateway.value(&name).map(|v| v.to_json()).unwrap_or(Value::Null);
    respond(status, json!({ name: value }))
}
