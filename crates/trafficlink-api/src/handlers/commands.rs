//! Command handlers.
//!
//! `create` and the history endpoints are operator-facing; `poll` and
//! `report` are the device protocol and go through the polling gateway.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use trafficlink_commands::{parse_command_id, Command};
use trafficlink_core::not_found_err;

use super::common::{created, device_key, ok, CreatedResult, HandlerResult};
use super::ServerState;

/// Body of `POST /commands`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommandRequest {
    pub device_id: String,
    pub command_type: String,
}

/// Body of `POST /commands/poll`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    pub device_id: String,
}

/// Body of `POST /commands/:command_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportOutcomeRequest {
    pub status: String,
}

/// Query of `GET /devices/:device_id/commands`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// `POST /commands` - queue a command for a device.
pub async fn create_command_handler(
    State(state): State<ServerState>,
    payload: Result<Json<CreateCommandRequest>, JsonRejection>,
) -> CreatedResult<Command> {
    let Json(request) = payload?;
    let command = state
        .queue
        .enqueue(&request.device_id, &request.command_type)?;
    created(command)
}

/// `POST /commands/poll` - device fetches its pending commands.
pub async fn poll_commands_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    payload: Result<Json<PollRequest>, JsonRejection>,
) -> HandlerResult<Vec<Command>> {
    let Json(request) = payload?;
    let key = device_key(&headers);
    let commands = state.gateway.poll(&request.device_id, key.as_deref())?;
    ok(commands)
}

/// `POST /commands/:command_id` - device reports a command's outcome.
pub async fn report_outcome_handler(
    State(state): State<ServerState>,
    Path(command_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ReportOutcomeRequest>, JsonRejection>,
) -> HandlerResult<Command> {
    let Json(request) = payload?;
    let key = device_key(&headers);
    let command = state
        .gateway
        .report(&command_id, &request.status, key.as_deref())?;
    ok(command)
}

/// `GET /commands/:command_id`
pub async fn get_command_handler(
    State(state): State<ServerState>,
    Path(command_id): Path<String>,
) -> HandlerResult<Command> {
    let id = parse_command_id(&command_id)?;
    ok(state.queue.get(id)?)
}

/// `GET /devices/:device_id/commands` - command history, newest first.
pub async fn device_commands_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> HandlerResult<Vec<Command>> {
    let Query(query) = query?;
    if !state.registry.exists(&device_id)? {
        return Err(not_found_err!("device {}", device_id).into());
    }
    ok(state.queue.list_for_device(&device_id, query.limit)?)
}
