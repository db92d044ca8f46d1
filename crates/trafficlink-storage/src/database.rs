//! The shared redb handle and the table layout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::backends::InMemoryBackend;
use redb::{ReadTransaction, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::Result;

/// Table definitions. All tables live in one file so that cascading deletes
/// and conditional writes can span them in a single transaction.
pub(crate) mod tables {
    use redb::TableDefinition;

    // key = device_id, value = DeviceRecord (JSON)
    pub const DEVICES: TableDefinition<&str, &str> = TableDefinition::new("devices");

    // key = api_key, value = device_id
    pub const API_KEYS: TableDefinition<&str, &str> = TableDefinition::new("device_api_keys");

    // key = device_id, value = PreferenceRecord (JSON)
    pub const PREFERENCES: TableDefinition<&str, &str> = TableDefinition::new("preferences");

    // key = command id, value = CommandRecord (JSON)
    pub const COMMANDS: TableDefinition<u64, &str> = TableDefinition::new("commands");

    // key = (device_id, command id): every command of a device, in creation order
    pub const DEVICE_COMMANDS: TableDefinition<(&str, u64), ()> =
        TableDefinition::new("device_commands");

    // key = (device_id, command id): only commands still pending
    pub const PENDING_COMMANDS: TableDefinition<(&str, u64), ()> =
        TableDefinition::new("pending_commands");

    // key = command id, value = lease expiry (unix millis)
    pub const COMMAND_LEASES: TableDefinition<u64, i64> = TableDefinition::new("command_leases");

    // key = counter name, value = last issued value
    pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

    pub const COMMAND_SEQ: &str = "command_seq";
}

/// Shared database handle.
pub struct Database {
    inner: redb::Database,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open or create the database file, creating parent directories and all
    /// tables as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let inner = redb::Database::create(path)?;
        let db = Self {
            inner,
            path: Some(path.to_path_buf()),
        };
        db.init_tables()?;

        info!(category = "storage", path = %path.display(), "Database opened");
        Ok(Arc::new(db))
    }

    /// Open a database that lives only in memory. Used by tests and one-off tools.
    pub fn in_memory() -> Result<Arc<Self>> {
        let inner = redb::Database::builder().create_with_backend(InMemoryBackend::new())?;
        let db = Self { inner, path: None };
        db.init_tables()?;
        Ok(Arc::new(db))
    }

    /// Location on disk, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_tables(&self) -> Result<()> {
        let txn = self.inner.begin_write()?;
        {
            txn.open_table(tables::DEVICES)?;
            txn.open_table(tables::API_KEYS)?;
            txn.open_table(tables::PREFERENCES)?;
            txn.open_table(tables::COMMANDS)?;
            txn.open_table(tables::DEVICE_COMMANDS)?;
            txn.open_table(tables::PENDING_COMMANDS)?;
            txn.open_table(tables::COMMAND_LEASES)?;
            txn.open_table(tables::META)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub(crate) fn begin_write(&self) -> Result<WriteTransaction> {
        Ok(self.inner.begin_write()?)
    }

    pub(crate) fn begin_read(&self) -> Result<ReadTransaction> {
        Ok(self.inner.begin_read()?)
    }
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}
