//! Device registration and lookup handlers (operator side).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use trafficlink_devices::NewDevice;

use super::common::{created, ok, CreatedResult, HandlerResult};
use super::ServerState;
use crate::models::DeviceDto;

/// `POST /devices` - register a device. The response is the only place the
/// device's API key is ever shown.
pub async fn register_device_handler(
    State(state): State<ServerState>,
    payload: Result<Json<NewDevice>, JsonRejection>,
) -> CreatedResult<DeviceDto> {
    let Json(request) = payload?;
    let device = state.registry.register(request)?;
    created(DeviceDto::with_key(device))
}

/// `GET /devices`
pub async fn list_devices_handler(State(state): State<ServerState>) -> HandlerResult<Vec<DeviceDto>> {
    let devices = state.registry.list()?;
    ok(devices.into_iter().map(DeviceDto::public).collect())
}

/// `GET /devices/:device_id`
pub async fn get_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<DeviceDto> {
    let device = state.registry.get(&device_id)?;
    ok(DeviceDto::public(device))
}

/// `DELETE /devices/:device_id` - removes the device with its preferences
/// and commands.
pub async fn delete_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    state.registry.delete(&device_id)?;
    ok(json!({ "deviceId": device_id, "deleted": true }))
}
