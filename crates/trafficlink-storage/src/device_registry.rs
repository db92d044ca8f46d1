//! Device registry storage using redb.
//!
//! Devices are keyed by their stable id. A secondary table maps each API key
//! back to its device so both uniqueness constraints are enforced inside the
//! same write transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::{from_json, tables, to_json, Database};
use crate::Result;

/// A registered field device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    pub name: String,
    pub location: String,
    /// Secret the device presents when polling.
    pub api_key: String,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DeviceExists,
    ApiKeyTaken,
}

/// Device table access.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    db: Arc<Database>,
}

impl DeviceStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a device unless its id or API key is already taken.
    pub fn insert(&self, record: &DeviceRecord) -> Result<InsertOutcome> {
        let txn = self.db.begin_write()?;
        {
            let mut devices = txn.open_table(tables::DEVICES)?;
            if devices.get(record.device_id.as_str())?.is_some() {
                return Ok(InsertOutcome::DeviceExists);
            }

            let mut keys = txn.open_table(tables::API_KEYS)?;
            if keys.get(record.api_key.as_str())?.is_some() {
                return Ok(InsertOutcome::ApiKeyTaken);
            }

            let json = to_json(record)?;
            devices.insert(record.device_id.as_str(), json.as_str())?;
            keys.insert(record.api_key.as_str(), record.device_id.as_str())?;
        }
        txn.commit()?;
        Ok(InsertOutcome::Inserted)
    }

    pub fn get(&self, device_id: &str) -> Result<Option<DeviceRecord>> {
        let txn = self.db.begin_read()?;
        let devices = txn.open_table(tables::DEVICES)?;
        let raw = devices.get(device_id)?.map(|v| v.value().to_string());
        raw.map(|raw| from_json(&raw)).transpose()
    }

    pub fn exists(&self, device_id: &str) -> Result<bool> {
        let txn = self.db.begin_read()?;
        let devices = txn.open_table(tables::DEVICES)?;
        let found = devices.get(device_id)?.is_some();
        Ok(found)
    }

    pub fn find_by_api_key(&self, api_key: &str) -> Result<Option<DeviceRecord>> {
        let txn = self.db.begin_read()?;
        let keys = txn.open_table(tables::API_KEYS)?;
        let device_id = match keys.get(api_key)? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };

        let devices = txn.open_table(tables::DEVICES)?;
        let raw = devices.get(device_id.as_str())?.map(|v| v.value().to_string());
        raw.map(|raw| from_json(&raw)).transpose()
    }

    /// Set `last_seen_at`. Returns `false` when the device does not exist.
    pub fn touch(&self, device_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let txn = self.db.begin_write()?;
        {
            let mut devices = txn.open_table(tables::DEVICES)?;
            let raw = devices.get(device_id)?.map(|v| v.value().to_string());
            let Some(raw) = raw else {
                return Ok(false);
            };

            let mut record: DeviceRecord = from_json(&raw)?;
            record.last_seen_at = Some(at);
            let json = to_json(&record)?;
            devices.insert(device_id, json.as_str())?;
        }
        txn.commit()?;
        Ok(true)
    }

    /// All devices ordered by id.
    pub fn list(&self) -> Result<Vec<DeviceRecord>> {
        let txn = self.db.begin_read()?;
        let devices = txn.open_table(tables::DEVICES)?;

        let mut out = Vec::new();
        for entry in devices.iter()? {
            let (_, v) = entry?;
            out.push(from_json(v.value())?);
        }
        Ok(out)
    }

    /// Remove a device together with its key, preferences and commands.
    /// Returns `false` when the device does not exist.
    pub fn delete(&self, device_id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed_commands;
        {
            let mut devices = txn.open_table(tables::DEVICES)?;
            let raw = devices.remove(device_id)?.map(|v| v.value().to_string());
            let Some(raw) = raw else {
                return Ok(false);
            };
            let record: DeviceRecord = from_json(&raw)?;

            let mut keys = txn.open_table(tables::API_KEYS)?;
            keys.remove(record.api_key.as_str())?;

            let mut prefs = txn.open_table(tables::PREFERENCES)?;
            prefs.remove(device_id)?;

            let mut device_commands = txn.open_table(tables::DEVICE_COMMANDS)?;
            let ids = device_commands
                .range((device_id, 0u64)..=(device_id, u64::MAX))?
                .map(|entry| entry.map(|(k, _)| k.value().1))
                .collect::<std::result::Result<Vec<u64>, redb::StorageError>>()?;

            let mut commands = txn.open_table(tables::COMMANDS)?;
            let mut pending = txn.open_table(tables::PENDING_COMMANDS)?;
            let mut leases = txn.open_table(tables::COMMAND_LEASES)?;
            for id in &ids {
                device_commands.remove((device_id, *id))?;
                pending.remove((device_id, *id))?;
                commands.remove(*id)?;
                leases.remove(*id)?;
            }
            removed_commands = ids.len();
        }
        txn.commit()?;

        debug!(device_id, removed_commands, "Device deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, key: &str) -> DeviceRecord {
        DeviceRecord {
            device_id: id.to_string(),
            name: format!("{} name", id),
            location: "Main St".to_string(),
            api_key: key.to_string(),
            last_seen_at: None,
            created_at: Utc::now(),
        }
    }

    fn store() -> DeviceStore {
        DeviceStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let rec = device("esp-1", "key-1");

        assert_eq!(store.insert(&rec).unwrap(), InsertOutcome::Inserted);
        assert!(store.exists("esp-1").unwrap());
        assert!(!store.exists("esp-2").unwrap());
        assert_eq!(store.get("esp-1").unwrap(), Some(rec.clone()));
        assert_eq!(store.find_by_api_key("key-1").unwrap(), Some(rec));
        assert_eq!(store.find_by_api_key("key-x").unwrap(), None);
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = store();
        store.insert(&device("esp-1", "key-1")).unwrap();

        assert_eq!(
            store.insert(&device("esp-1", "key-2")).unwrap(),
            InsertOutcome::DeviceExists
        );
        assert_eq!(
            store.insert(&device("esp-2", "key-1")).unwrap(),
            InsertOutcome::ApiKeyTaken
        );
        // Rejected inserts leave nothing behind.
        assert!(!store.exists("esp-2").unwrap());
        assert_eq!(store.find_by_api_key("key-2").unwrap(), None);
    }

    #[test]
    fn test_touch() {
        let store = store();
        store.insert(&device("esp-1", "key-1")).unwrap();

        let at = Utc::now();
        assert!(store.touch("esp-1", at).unwrap());
        assert_eq!(store.get("esp-1").unwrap().unwrap().last_seen_at, Some(at));
        assert!(!store.touch("ghost", at).unwrap());
    }

    #[test]
    fn test_list_ordered_by_id() {
        let store = store();
        store.insert(&device("esp-b", "kb")).unwrap();
        store.insert(&device("esp-a", "ka")).unwrap();

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|d| d.device_id).collect();
        assert_eq!(ids, vec!["esp-a", "esp-b"]);
    }

    #[test]
    fn test_delete_frees_id_and_key() {
        let store = store();
        store.insert(&device("esp-1", "key-1")).unwrap();

        assert!(store.delete("esp-1").unwrap());
        assert!(!store.delete("esp-1").unwrap());
        assert_eq!(store.find_by_api_key("key-1").unwrap(), None);
        assert_eq!(
            store.insert(&device("esp-1", "key-1")).unwrap(),
            InsertOutcome::Inserted
        );
    }
}
