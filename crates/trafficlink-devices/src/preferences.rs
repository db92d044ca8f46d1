//! Preference store: server-held device configuration.
//!
//! Operators push partial updates, devices pull the full row on sync. Both
//! operations reject unregistered devices before anything is written.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use trafficlink_core::config::preferences as bounds;
use trafficlink_core::{not_found_err, validation_err, Result};
use trafficlink_storage::{Database, DeviceStore, PreferencePatch, PreferenceRecord, PrefsStore};

/// Operator-supplied partial update, as received.
///
/// Fields are kept as raw JSON so that a value of the wrong type (`150.5`,
/// `"fast"`) is reported against its field like an out-of-range number,
/// instead of failing the whole body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    #[serde(default)]
    pub disabled_pins: Option<Value>,
    #[serde(default)]
    pub sampling_rate_ms: Option<Value>,
    #[serde(default)]
    pub jam_threshold_cm: Option<Value>,
}

impl PreferenceUpdate {
    pub fn with_disabled_pins(mut self, pins: Vec<i64>) -> Self {
        self.disabled_pins = Some(Value::from(pins));
        self
    }

    pub fn with_sampling_rate_ms(mut self, value: i64) -> Self {
        self.sampling_rate_ms = Some(Value::from(value));
        self
    }

    pub fn with_jam_threshold_cm(mut self, value: i64) -> Self {
        self.jam_threshold_cm = Some(Value::from(value));
        self
    }

    /// Check every supplied field against its type and bounds.
    pub fn validate(&self) -> Result<PreferencePatch> {
        let disabled_pins = self.disabled_pins.as_ref().map(pins).transpose()?;

        let sampling_rate_ms = self
            .sampling_rate_ms
            .as_ref()
            .map(|v| {
                in_range(
                    "samplingRateMs",
                    v,
                    bounds::SAMPLING_RATE_MS_MIN,
                    bounds::SAMPLING_RATE_MS_MAX,
                )
            })
            .transpose()?;

        let jam_threshold_cm = self
            .jam_threshold_cm
            .as_ref()
            .map(|v| {
                in_range(
                    "jamThresholdCm",
                    v,
                    bounds::JAM_THRESHOLD_CM_MIN,
                    bounds::JAM_THRESHOLD_CM_MAX,
                )
            })
            .transpose()?;

        Ok(PreferencePatch {
            disabled_pins,
            sampling_rate_ms,
            jam_threshold_cm,
        })
    }
}

fn pins(value: &Value) -> Result<Vec<u32>> {
    let items = value
        .as_array()
        .ok_or_else(|| validation_err!("disabledPins", "must be an array of pin numbers"))?;

    items
        .iter()
        .map(|pin| {
            pin.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| validation_err!("disabledPins", "{} is not a valid GPIO number", pin))
        })
        .collect()
}

fn in_range(field: &str, value: &Value, min: u32, max: u32) -> Result<u32> {
    let n = value
        .as_i64()
        .ok_or_else(|| validation_err!(field, "must be an integer, got {}", value))?;
    if n < i64::from(min) || n > i64::from(max) {
        return Err(validation_err!(field, "must be between {} and {}, got {}", min, max, n));
    }
    // Bounded by `max` above.
    Ok(n as u32)
}

/// Server-held preferences, one row per device.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    prefs: PrefsStore,
    devices: DeviceStore,
}

impl PreferenceStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            prefs: PrefsStore::new(db.clone()),
            devices: DeviceStore::new(db),
        }
    }

    /// Apply an operator update, creating the row from defaults if needed.
    ///
    /// Fields are validated first, then the device is checked; on any error
    /// the stored row is left as it was.
    pub fn upsert(&self, device_id: &str, update: &PreferenceUpdate) -> Result<PreferenceRecord> {
        let patch = update.validate()?;

        let record = self
            .prefs
            .upsert(device_id, &patch, Utc::now())?
            .ok_or_else(|| not_found_err!("device {}", device_id))?;

        info!(
            device_id,
            sampling_rate_ms = record.sampling_rate_ms,
            jam_threshold_cm = record.jam_threshold_cm,
            disabled_pins = record.disabled_pins.len(),
            "Preferences updated"
        );
        Ok(record)
    }

    /// Device-side pull. Creates the default row on first call; later calls
    /// return the stored row unchanged.
    pub fn sync(&self, device_id: &str) -> Result<PreferenceRecord> {
        let record = self
            .prefs
            .get_or_create(device_id, Utc::now())?
            .ok_or_else(|| not_found_err!("device {}", device_id))?;

        debug!(device_id, "Preferences synced");
        Ok(record)
    }

    /// Read-only view. Returns the defaults, without storing them, when the
    /// device has no row yet.
    pub fn get(&self, device_id: &str) -> Result<PreferenceRecord> {
        if let Some(record) = self.prefs.get(device_id)? {
            return Ok(record);
        }
        if self.devices.exists(device_id)? {
            return Ok(PreferenceRecord::defaults(device_id, Utc::now()));
        }
        Err(not_found_err!("device {}", device_id))
    }
}
