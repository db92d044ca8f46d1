//! Unified error handling for the API.
//!
//! Domain errors are translated to HTTP here and nowhere else.

use std::fmt;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use trafficlink_core::{Error, ErrorKind};

/// API error response with its HTTP status.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Offending input field, for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            status,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Validation error (400).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message, StatusCode::BAD_REQUEST)
    }

    /// Unauthorized (401).
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message, StatusCode::UNAUTHORIZED)
    }

    /// Not found (404).
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message, StatusCode::NOT_FOUND)
    }

    /// Invalid state transition (409).
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new("INVALID_TRANSITION", message, StatusCode::CONFLICT)
    }

    /// Conflict (409).
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message, StatusCode::CONFLICT)
    }

    /// Internal server error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message, StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = serde_json::json!({
            "success": false,
            "error": self,
        });
        (status, axum::Json(body)).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

impl From<Error> for ErrorResponse {
    fn from(e: Error) -> Self {
        match e.kind() {
            ErrorKind::Validation => match e.field() {
                Some(field) => Self::validation(e.to_string()).with_field(field),
                None => Self::validation(e.to_string()),
            },
            ErrorKind::NotFound => Self::not_found(e.to_string()),
            ErrorKind::InvalidTransition => Self::invalid_transition(e.to_string()),
            ErrorKind::Conflict => Self::conflict(e.to_string()),
            ErrorKind::Unauthorized => Self::unauthorized(e.to_string()),
            ErrorKind::Internal => {
                tracing::error!(error = %e, "Request failed with internal error");
                Self::internal("internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(format!("Invalid request data: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ErrorResponse {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_mapping() {
        let cases = [
            (Error::validation("samplingRateMs", "too low"), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (Error::not_found("device esp-9"), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (Error::invalid_transition("done"), StatusCode::CONFLICT, "INVALID_TRANSITION"),
            (Error::conflict("dup"), StatusCode::CONFLICT, "CONFLICT"),
            (Error::unauthorized("no key"), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (Error::storage("disk full"), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];

        for (err, status, code) in cases {
            let resp = ErrorResponse::from(err);
            assert_eq!(resp.status, status);
            assert_eq!(resp.code, code);
        }
    }

    #[test]
    fn test_validation_carries_field() {
        let resp = ErrorResponse::from(Error::validation("jamThresholdCm", "too high"));
        assert_eq!(resp.field.as_deref(), Some("jamThresholdCm"));

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["field"], "jamThresholdCm");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_internal_details_hidden() {
        let resp = ErrorResponse::from(Error::storage("redb exploded at /var/lib"));
        assert_eq!(resp.message, "internal server error");
    }
}
