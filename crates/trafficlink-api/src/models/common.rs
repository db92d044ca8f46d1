//! Unified API response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Success envelope.
///
/// ```json
/// {
///   "success": true,
///   "data": { ... },
///   "meta": { "timestamp": "2024-01-01T00:00:00Z", "requestId": "..." }
/// }
/// ```
///
/// Failures use [`ErrorResponse`](super::error::ErrorResponse), which renders
/// `success: false` with an `error` object instead of `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            meta: Some(ResponseMeta::default()),
        }
    }
}

/// Response metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    /// Unique request ID for tracing.
    pub request_id: String,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}
