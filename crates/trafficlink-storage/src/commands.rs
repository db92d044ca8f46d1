//! Command rows, their per-device indexes and poll leases.
//!
//! Layout:
//! - `commands`: id -> record
//! - `device_commands`: (device_id, id), every command of a device
//! - `pending_commands`: (device_id, id), removed when the command resolves
//! - `command_leases`: id -> lease expiry, only for pending commands
//!
//! Ids come from a counter in the `meta` table that is bumped in the same
//! transaction as the insert, so they are unique and strictly increasing
//! across restarts. Scanning an index in key order therefore yields commands
//! oldest first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use tracing::debug;
use trafficlink_core::{CommandStatus, CommandType};

use crate::database::{from_json, tables, to_json, Database};
use crate::{Error, Result};

/// A queued command and its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub id: u64,
    pub device_id: String,
    pub command_type: CommandType,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly when the command leaves `pending`.
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
}

/// Result of a conditional status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The command was pending and now holds the target status.
    Applied(CommandRecord),
    /// No command has this id.
    NotFound,
    /// The command's current status does not allow the change. Carries the
    /// record as it is stored.
    Rejected(CommandRecord),
}

/// Command table access.
#[derive(Debug, Clone)]
pub struct CommandStore {
    db: Arc<Database>,
}

impl CommandStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a pending command for a registered device.
    ///
    /// `None` means the device is not registered; nothing is written then.
    pub fn insert(
        &self,
        device_id: &str,
        command_type: CommandType,
        now: DateTime<Utc>,
    ) -> Result<Option<CommandRecord>> {
        let txn = self.db.begin_write()?;
        let record = {
            let devices = txn.open_table(tables::DEVICES)?;
            if devices.get(device_id)?.is_none() {
                return Ok(None);
            }

            let mut meta = txn.open_table(tables::META)?;
            let last = meta.get(tables::COMMAND_SEQ)?.map(|v| v.value()).unwrap_or(0);
            let id = last + 1;
            meta.insert(tables::COMMAND_SEQ, id)?;

            let record = CommandRecord {
                id,
                device_id: device_id.to_string(),
                command_type,
                status: CommandStatus::Pending,
                created_at: now,
                executed_at: None,
            };

            let json = to_json(&record)?;
            let mut commands = txn.open_table(tables::COMMANDS)?;
            commands.insert(id, json.as_str())?;

            let mut device_commands = txn.open_table(tables::DEVICE_COMMANDS)?;
            device_commands.insert((device_id, id), ())?;

            let mut pending = txn.open_table(tables::PENDING_COMMANDS)?;
            pending.insert((device_id, id), ())?;

            record
        };
        txn.commit()?;
        Ok(Some(record))
    }

    pub fn get(&self, id: u64) -> Result<Option<CommandRecord>> {
        let txn = self.db.begin_read()?;
        let commands = txn.open_table(tables::COMMANDS)?;
        let raw = commands.get(id)?.map(|v| v.value().to_string());
        raw.map(|raw| from_json(&raw)).transpose()
    }

    /// Up to `limit` pending commands of a device, oldest first. Read only.
    pub fn list_pending(&self, device_id: &str, limit: usize) -> Result<Vec<CommandRecord>> {
        let txn = self.db.begin_read()?;
        let pending = txn.open_table(tables::PENDING_COMMANDS)?;
        let commands = txn.open_table(tables::COMMANDS)?;

        let mut out = Vec::new();
        for entry in pending
            .range((device_id, 0u64)..=(device_id, u64::MAX))?
            .take(limit)
        {
            let (key, _) = entry?;
            let id = key.value().1;
            let raw = commands.get(id)?.map(|v| v.value().to_string());
            out.push(decode_indexed(id, raw)?);
        }
        Ok(out)
    }

    /// Lease up to `limit` pending commands whose lease is absent or expired,
    /// oldest first. Returned commands stay `pending`; they are just hidden
    /// from other claims until `lease_until`.
    pub fn claim_pending(
        &self,
        device_id: &str,
        limit: usize,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<CommandRecord>> {
        let now_ms = now.timestamp_millis();
        let until_ms = lease_until.timestamp_millis();

        let txn = self.db.begin_write()?;
        let claimed = {
            let pending = txn.open_table(tables::PENDING_COMMANDS)?;
            let mut leases = txn.open_table(tables::COMMAND_LEASES)?;
            let commands = txn.open_table(tables::COMMANDS)?;

            let mut selected = Vec::new();
            for entry in pending.range((device_id, 0u64)..=(device_id, u64::MAX))? {
                if selected.len() >= limit {
                    break;
                }
                let (key, _) = entry?;
                let id = key.value().1;
                let lease = leases.get(id)?.map(|v| v.value());
                if lease.map_or(true, |expires| expires <= now_ms) {
                    selected.push(id);
                }
            }

            let mut claimed = Vec::with_capacity(selected.len());
            for id in selected {
                leases.insert(id, until_ms)?;
                let raw = commands.get(id)?.map(|v| v.value().to_string());
                claimed.push(decode_indexed(id, raw)?);
            }
            claimed
        };
        txn.commit()?;

        if !claimed.is_empty() {
            debug!(device_id, count = claimed.len(), "Commands leased");
        }
        Ok(claimed)
    }

    /// Move a command to `to` if, and only if, its current status allows it.
    ///
    /// The check and the write share one write transaction, so of two racing
    /// calls for the same pending command exactly one is `Applied`.
    pub fn transition(
        &self,
        id: u64,
        to: CommandStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let txn = self.db.begin_write()?;
        let record = {
            let mut commands = txn.open_table(tables::COMMANDS)?;
            let raw = commands.get(id)?.map(|v| v.value().to_string());
            let Some(raw) = raw else {
                return Ok(TransitionOutcome::NotFound);
            };

            let mut record: CommandRecord = from_json(&raw)?;
            if !record.status.can_transition_to(to) {
                return Ok(TransitionOutcome::Rejected(record));
            }

            record.status = to;
            record.executed_at = Some(now);
            let json = to_json(&record)?;
            commands.insert(id, json.as_str())?;

            let mut pending = txn.open_table(tables::PENDING_COMMANDS)?;
            pending.remove((record.device_id.as_str(), id))?;

            let mut leases = txn.open_table(tables::COMMAND_LEASES)?;
            leases.remove(id)?;

            record
        };
        txn.commit()?;
        Ok(TransitionOutcome::Applied(record))
    }

    /// Up to `limit` commands of a device in any state, newest first.
    pub fn list_for_device(&self, device_id: &str, limit: usize) -> Result<Vec<CommandRecord>> {
        let txn = self.db.begin_read()?;
        let device_commands = txn.open_table(tables::DEVICE_COMMANDS)?;
        let commands = txn.open_table(tables::COMMANDS)?;

        let mut out = Vec::new();
        for entry in device_commands
            .range((device_id, 0u64)..=(device_id, u64::MAX))?
            .rev()
            .take(limit)
        {
            let (key, _) = entry?;
            let id = key.value().1;
            let raw = commands.get(id)?.map(|v| v.value().to_string());
            out.push(decode_indexed(id, raw)?);
        }
        Ok(out)
    }
}

fn decode_indexed(id: u64, raw: Option<String>) -> Result<CommandRecord> {
    match raw {
        Some(raw) => from_json(&raw),
        None => Err(Error::Corrupt(format!(
            "command {} is indexed but has no record",
            id
        ))),
    }
}
