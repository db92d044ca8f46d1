//! Per-device preference rows.
//!
//! At most one row exists per device. Rows are created lazily, either by a
//! device sync (defaults) or by an operator update (defaults merged with the
//! patch). Both paths check that the device is registered inside the same
//! write transaction that creates the row.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use trafficlink_core::config::preferences as bounds;

use crate::database::{from_json, tables, to_json, Database};
use crate::Result;

/// Stored device preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    pub device_id: String,
    /// GPIO pins the device must leave idle. Kept sorted and de-duplicated.
    pub disabled_pins: Vec<u32>,
    pub sampling_rate_ms: u32,
    pub jam_threshold_cm: u32,
    pub updated_at: DateTime<Utc>,
}

impl PreferenceRecord {
    pub fn defaults(device_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            disabled_pins: Vec::new(),
            sampling_rate_ms: bounds::SAMPLING_RATE_MS_DEFAULT,
            jam_threshold_cm: bounds::JAM_THRESHOLD_CM_DEFAULT,
            updated_at: now,
        }
    }

    /// Merge the supplied fields, leaving the others untouched.
    pub fn apply(&mut self, patch: &PreferencePatch, now: DateTime<Utc>) {
        if let Some(pins) = &patch.disabled_pins {
            let mut pins = pins.clone();
            pins.sort_unstable();
            pins.dedup();
            self.disabled_pins = pins;
        }
        if let Some(rate) = patch.sampling_rate_ms {
            self.sampling_rate_ms = rate;
        }
        if let Some(threshold) = patch.jam_threshold_cm {
            self.jam_threshold_cm = threshold;
        }
        self.updated_at = now;
    }
}

/// Partial preference update. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferencePatch {
    pub disabled_pins: Option<Vec<u32>>,
    pub sampling_rate_ms: Option<u32>,
    pub jam_threshold_cm: Option<u32>,
}

/// Preference table access.
#[derive(Debug, Clone)]
pub struct PrefsStore {
    db: Arc<Database>,
}

impl PrefsStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get(&self, device_id: &str) -> Result<Option<PreferenceRecord>> {
        let txn = self.db.begin_read()?;
        let prefs = txn.open_table(tables::PREFERENCES)?;
        let raw = prefs.get(device_id)?.map(|v| v.value().to_string());
        raw.map(|raw| from_json(&raw)).transpose()
    }

    /// Return the device's row, inserting the defaults if it has none.
    ///
    /// `None` means the device is not registered; nothing is written then.
    pub fn get_or_create(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PreferenceRecord>> {
        if let Some(existing) = self.get(device_id)? {
            return Ok(Some(existing));
        }

        let txn = self.db.begin_write()?;
        let record = {
            let devices = txn.open_table(tables::DEVICES)?;
            if devices.get(device_id)?.is_none() {
                return Ok(None);
            }

            let mut prefs = txn.open_table(tables::PREFERENCES)?;
            // Another writer may have created the row since the read above.
            let raw = prefs.get(device_id)?.map(|v| v.value().to_string());
            if let Some(raw) = raw {
                return Ok(Some(from_json(&raw)?));
            }

            let record = PreferenceRecord::defaults(device_id, now);
            let json = to_json(&record)?;
            prefs.insert(device_id, json.as_str())?;
            record
        };
        txn.commit()?;
        Ok(Some(record))
    }

    /// Merge `patch` into the device's row, creating it from the defaults if
    /// absent. Read, merge and write happen in one transaction.
    ///
    /// `None` means the device is not registered; nothing is written then.
    pub fn upsert(
        &self,
        device_id: &str,
        patch: &PreferencePatch,
        now: DateTime<Utc>,
    ) -> Result<Option<PreferenceRecord>> {
        let txn = self.db.begin_write()?;
        let record = {
            let devices = txn.open_table(tables::DEVICES)?;
            if devices.get(device_id)?.is_none() {
                return Ok(None);
            }

            let mut prefs = txn.open_table(tables::PREFERENCES)?;
            let raw = prefs.get(device_id)?.map(|v| v.value().to_string());
            let mut record = match raw {
                Some(raw) => from_json(&raw)?,
                None => PreferenceRecord::defaults(device_id, now),
            };
            record.apply(patch, now);

            let json = to_json(&record)?;
            prefs.insert(device_id, json.as_str())?;
            record
        };
        txn.commit()?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_registry::{DeviceRecord, DeviceStore};

    fn setup() -> (DeviceStore, PrefsStore) {
        let db = Database::in_memory().unwrap();
        let devices = DeviceStore::new(db.clone());
        devices
            .insert(&DeviceRecord {
                device_id: "esp-1".to_string(),
                name: "Junction 1".to_string(),
                location: "North gate".to_string(),
                api_key: "k1".to_string(),
                last_seen_at: None,
                created_at: Utc::now(),
            })
            .unwrap();
        (devices, PrefsStore::new(db))
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (_, prefs) = setup();
        assert_eq!(prefs.get("esp-1").unwrap(), None);

        let first = prefs.get_or_create("esp-1", Utc::now()).unwrap().unwrap();
        assert_eq!(first.sampling_rate_ms, 1000);
        assert_eq!(first.jam_threshold_cm, 50);
        assert!(first.disabled_pins.is_empty());

        let second = prefs.get_or_create("esp-1", Utc::now()).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unregistered_device_writes_nothing() {
        let (_, prefs) = setup();
        assert_eq!(prefs.get_or_create("ghost", Utc::now()).unwrap(), None);

        let patch = PreferencePatch {
            sampling_rate_ms: Some(500),
            ..Default::default()
        };
        assert_eq!(prefs.upsert("ghost", &patch, Utc::now()).unwrap(), None);
        assert_eq!(prefs.get("ghost").unwrap(), None);
    }

    #[test]
    fn test_upsert_creates_then_merges() {
        let (_, prefs) = setup();

        let patch = PreferencePatch {
            disabled_pins: Some(vec![7, 3, 7]),
            ..Default::default()
        };
        let created = prefs.upsert("esp-1", &patch, Utc::now()).unwrap().unwrap();
        assert_eq!(created.disabled_pins, vec![3, 7]);
        assert_eq!(created.sampling_rate_ms, 1000);

        let patch = PreferencePatch {
            jam_threshold_cm: Some(120),
            ..Default::default()
        };
        let merged = prefs.upsert("esp-1", &patch, Utc::now()).unwrap().unwrap();
        assert_eq!(merged.disabled_pins, vec![3, 7]);
        assert_eq!(merged.jam_threshold_cm, 120);
        assert_eq!(prefs.get("esp-1").unwrap(), Some(merged));
    }

    #[test]
    fn test_device_delete_removes_row() {
        let (devices, prefs) = setup();
        prefs.get_or_create("esp-1", Utc::now()).unwrap();

        devices.delete("esp-1").unwrap();
        assert_eq!(prefs.get("esp-1").unwrap(), None);
    }
}
