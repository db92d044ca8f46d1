//! Preference handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use trafficlink_devices::{PreferenceRecord, PreferenceUpdate};

use super::common::{device_key, ok, HandlerResult};
use super::ServerState;

/// Body of `POST /preferences/sync`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub device_id: String,
}

/// `POST /preferences/:device_id` - operator partial update.
pub async fn update_preferences_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
    payload: Result<Json<PreferenceUpdate>, JsonRejection>,
) -> HandlerResult<PreferenceRecord> {
    let Json(update) = payload?;
    ok(state.preferences.upsert(&device_id, &update)?)
}

/// `POST /preferences/sync` - device pulls its preferences.
pub async fn sync_preferences_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> HandlerResult<PreferenceRecord> {
    let Json(request) = payload?;
    let key = device_key(&headers);
    ok(state
        .gateway
        .sync_preferences(&request.device_id, key.as_deref())?)
}

/// `GET /preferences/:device_id` - read without creating a row.
pub async fn get_preferences_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<PreferenceRecord> {
    ok(state.preferences.get(&device_id)?)
}
