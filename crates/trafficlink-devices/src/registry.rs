//! Device registry.
//!
//! Registration issues each device a random API key (`tlk_` followed by 32 hex
//! characters). The key is returned once at registration and afterwards only
//! used to look the device up.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use trafficlink_core::{not_found_err, validation_err, Error, Result};
use trafficlink_storage::{Database, DeviceRecord, DeviceStore, InsertOutcome};
use uuid::Uuid;

const API_KEY_PREFIX: &str = "tlk_";

/// Attempts at drawing an unused API key before giving up.
const MAX_KEY_ATTEMPTS: usize = 3;

const MIN_FIELD_LEN: usize = 3;
const MAX_DEVICE_ID_LEN: usize = 64;

/// Registration request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub device_id: String,
    pub name: String,
    pub location: String,
}

impl NewDevice {
    pub fn new(
        device_id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            name: name.into(),
            location: location.into(),
        }
    }

    /// Trim every field and check it.
    pub fn normalized(self) -> Result<Self> {
        let device_id = self.device_id.trim().to_string();
        let name = self.name.trim().to_string();
        let location = self.location.trim().to_string();

        validate_device_id(&device_id)?;
        require_len("name", &name)?;
        require_len("location", &location)?;

        Ok(Self {
            device_id,
            name,
            location,
        })
    }
}

fn require_len(field: &str, value: &str) -> Result<()> {
    if value.chars().count() < MIN_FIELD_LEN {
        return Err(validation_err!(field, "must be at least {} characters", MIN_FIELD_LEN));
    }
    Ok(())
}

fn validate_device_id(device_id: &str) -> Result<()> {
    require_len("deviceId", device_id)?;
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(validation_err!("deviceId", "must be at most {} characters", MAX_DEVICE_ID_LEN));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':');
    if !device_id.chars().all(allowed) {
        return Err(validation_err!(
            "deviceId",
            "may only contain letters, digits, '-', '_', '.' and ':'"
        ));
    }
    Ok(())
}

/// Generate a fresh device API key.
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, Uuid::new_v4().simple())
}

/// Registry of field devices.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    store: DeviceStore,
}

impl DeviceRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            store: DeviceStore::new(db),
        }
    }

    /// Register a device. Fails with `Conflict` if the id is taken.
    pub fn register(&self, request: NewDevice) -> Result<DeviceRecord> {
        let request = request.normalized()?;

        for _ in 0..MAX_KEY_ATTEMPTS {
            let record = DeviceRecord {
                device_id: request.device_id.clone(),
                name: request.name.clone(),
                location: request.location.clone(),
                api_key: generate_api_key(),
                last_seen_at: None,
                created_at: Utc::now(),
            };

            match self.store.insert(&record)? {
                InsertOutcome::Inserted => {
                    info!(device_id = %record.device_id, location = %record.location, "Device registered");
                    return Ok(record);
                }
                InsertOutcome::DeviceExists => {
                    return Err(Error::conflict(format!(
                        "device {} is already registered",
                        record.device_id
                    )));
                }
                InsertOutcome::ApiKeyTaken => {
                    warn!(device_id = %record.device_id, "Generated API key collided, retrying");
                }
            }
        }

        Err(Error::internal("could not generate a unique API key"))
    }

    pub fn exists(&self, device_id: &str) -> Result<bool> {
        Ok(self.store.exists(device_id)?)
    }

    pub fn get(&self, device_id: &str) -> Result<DeviceRecord> {
        self.store
            .get(device_id)?
            .ok_or_else(|| not_found_err!("device {}", device_id))
    }

    pub fn list(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.store.list()?)
    }

    /// Delete a device with its preferences and commands.
    pub fn delete(&self, device_id: &str) -> Result<()> {
        if !self.store.delete(device_id)? {
            return Err(not_found_err!("device {}", device_id));
        }
        info!(device_id, "Device deleted");
        Ok(())
    }

    /// Record that the device was just heard from.
    ///
    /// Best effort: failures are logged and never reach the caller.
    pub fn touch(&self, device_id: &str) {
        match self.store.touch(device_id, Utc::now()) {
            Ok(true) => {}
            Ok(false) => warn!(device_id, "Cannot update last seen time of unknown device"),
            Err(e) => warn!(device_id, error = %e, "Failed to update last seen time"),
        }
    }

    /// Resolve the device that owns `api_key`.
    pub fn authenticate(&self, api_key: &str) -> Result<DeviceRecord> {
        self.store
            .find_by_api_key(api_key)?
            .ok_or_else(|| Error::unauthorized("unknown device key"))
    }
}
