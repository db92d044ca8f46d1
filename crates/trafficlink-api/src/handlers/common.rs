//! Common API handler utilities.

use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;

use crate::models::{ApiResponse, ErrorResponse};

/// Header carrying a device's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Unified Result type for API handlers. The success value is wrapped in
/// [`ApiResponse`].
pub type HandlerResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

/// Result type for handlers that create a resource (201).
pub type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ErrorResponse>;

/// Wrap a value in a 200 success envelope.
pub fn ok<T>(data: T) -> HandlerResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// Wrap a value in a 201 success envelope.
pub fn created<T>(data: T) -> CreatedResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

/// Device API key from `X-API-Key`, falling back to `Authorization: Bearer`.
pub fn device_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        let key = key.trim();
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
