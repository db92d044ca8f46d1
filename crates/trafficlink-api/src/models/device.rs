//! Device view returned by the API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use trafficlink_devices::DeviceRecord;

/// Device as shown to operators. The API key is only included in the
/// registration response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub device_id: String,
    pub name: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DeviceDto {
    /// View without the secret.
    pub fn public(record: DeviceRecord) -> Self {
        Self {
            api_key: None,
            ..Self::with_key(record)
        }
    }

    /// View including the secret, for the registering operator.
    pub fn with_key(record: DeviceRecord) -> Self {
        Self {
            device_id: record.device_id,
            name: record.name,
            location: record.location,
            api_key: Some(record.api_key),
            last_seen_at: record.last_seen_at,
            created_at: record.created_at,
        }
    }
}
