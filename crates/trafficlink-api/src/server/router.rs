//! Application router configuration.

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use trafficlink_core::config::server::MAX_REQUEST_BODY_SIZE;

use super::ServerState;
use crate::handlers::common::API_KEY_HEADER;
use crate::handlers::{basic, commands, devices, preferences};

/// Create the application router with a specific state.
pub fn create_router(state: ServerState, cors_origin: &str) -> Router {
    Router::new()
        .route("/", get(basic::root_handler))
        .route("/api/health", get(basic::health_handler))
        // Devices (operator)
        .route(
            "/devices",
            post(devices::register_device_handler).get(devices::list_devices_handler),
        )
        .route(
            "/devices/:device_id",
            get(devices::get_device_handler).delete(devices::delete_device_handler),
        )
        .route("/devices/:device_id/commands", get(commands::device_commands_handler))
        // Commands. `poll` must stay a static segment next to `:command_id`.
        .route("/commands", post(commands::create_command_handler))
        .route("/commands/poll", post(commands::poll_commands_handler))
        .route(
            "/commands/:command_id",
            post(commands::report_outcome_handler).get(commands::get_command_handler),
        )
        // Preferences
        .route("/preferences/sync", post(preferences::sync_preferences_handler))
        .route(
            "/preferences/:device_id",
            post(preferences::update_preferences_handler).get(preferences::get_preferences_handler),
        )
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_SIZE))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .expose_headers([header::CONTENT_LENGTH])
        .max_age(Duration::from_secs(600));

    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value).allow_credentials(true),
        Err(_) => {
            warn!(category = "config", origin, "Invalid CORS origin, cross-origin requests disabled");
            layer
        }
    }
}
