//! Basic handlers - service banner and health check.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ServerState;

/// Service banner.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

/// `GET /`
pub async fn root_handler() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Real-Time Adaptive Traffic System API",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

/// `GET /api/health`
pub async fn health_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let uptime_secs = (chrono::Utc::now().timestamp() - state.started_at).max(0);
    Json(serde_json::json!({
        "status": "ok",
        "service": "trafficlink",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": uptime_secs,
    }))
}
