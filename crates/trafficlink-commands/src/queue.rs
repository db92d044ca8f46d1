//! Durable command queue.
//!
//! Commands are created `pending` and leave that state exactly once, through
//! [`CommandQueue::report_outcome`]. Reads never change state. Claiming adds a
//! short lease on top of `pending` so overlapping polls do not hand the same
//! command out twice; the lease is not a status of its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use trafficlink_core::config::polling;
use trafficlink_core::{not_found_err, Error, Result};
use trafficlink_storage::{CommandStore, Database, TransitionOutcome};

use crate::command::{Command, CommandId, CommandOutcome, CommandStatus, CommandType};

/// Per-device command queue backed by the shared database.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    store: CommandStore,
}

impl CommandQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            store: CommandStore::new(db),
        }
    }

    /// Queue a command for a registered device.
    pub fn enqueue(&self, device_id: &str, command_type: &str) -> Result<Command> {
        let command_type: CommandType = command_type.parse()?;

        let command = self
            .store
            .insert(device_id, command_type, Utc::now())?
            .ok_or_else(|| not_found_err!("device {}", device_id))?;

        info!(
            command_id = command.id,
            device_id,
            command_type = %command.command_type,
            "Command queued"
        );
        Ok(command)
    }

    /// Pending commands of a device, oldest first, at most
    /// `min(limit, 10)`. Read only; nothing is claimed.
    pub fn list_pending(&self, device_id: &str, limit: Option<usize>) -> Result<Vec<Command>> {
        let limit = batch_size(limit);
        Ok(self.store.list_pending(device_id, limit)?)
    }

    /// Like [`list_pending`](Self::list_pending), but skips commands another
    /// poll leased less than `lease` ago and leases the returned ones.
    pub fn claim_pending(
        &self,
        device_id: &str,
        limit: Option<usize>,
        lease: Duration,
    ) -> Result<Vec<Command>> {
        let limit = batch_size(limit);
        let lease = chrono::Duration::from_std(lease)
            .map_err(|_| Error::config(format!("claim lease {:?} is out of range", lease)))?;

        let now = Utc::now();
        let lease_until = now
            .checked_add_signed(lease)
            .ok_or_else(|| Error::config(format!("claim lease {:?} is out of range", lease)))?;
        Ok(self.store.claim_pending(device_id, limit, now, lease_until)?)
    }

    /// Record a device's outcome. Succeeds only for a pending command; the
    /// second report for the same command fails with `InvalidTransition`.
    pub fn report_outcome(&self, id: CommandId, outcome: CommandOutcome) -> Result<Command> {
        let target = CommandStatus::from(outcome);

        match self.store.transition(id, target, Utc::now())? {
            TransitionOutcome::Applied(command) => {
                info!(
                    command_id = id,
                    device_id = %command.device_id,
                    status = %command.status,
                    "Command resolved"
                );
                Ok(command)
            }
            TransitionOutcome::NotFound => Err(not_found_err!("command {}", id)),
            TransitionOutcome::Rejected(current) => {
                warn!(
                    command_id = id,
                    current = %current.status,
                    requested = %target,
                    "Rejected outcome for resolved command"
                );
                Err(Error::invalid_transition(format!(
                    "command {} is already {}",
                    id, current.status
                )))
            }
        }
    }

    pub fn get(&self, id: CommandId) -> Result<Command> {
        self.store
            .get(id)?
            .ok_or_else(|| not_found_err!("command {}", id))
    }

    /// Command history of a device, newest first.
    pub fn list_for_device(&self, device_id: &str, limit: Option<usize>) -> Result<Vec<Command>> {
        let limit = limit
            .unwrap_or(polling::DEFAULT_HISTORY_LIMIT)
            .min(polling::MAX_HISTORY_LIMIT);
        let commands = self.store.list_for_device(device_id, limit)?;
        debug!(device_id, count = commands.len(), "Command history read");
        Ok(commands)
    }
}

fn batch_size(limit: Option<usize>) -> usize {
    limit.unwrap_or(polling::MAX_BATCH).min(polling::MAX_BATCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size() {
        assert_eq!(batch_size(None), 10);
        assert_eq!(batch_size(Some(3)), 3);
        assert_eq!(batch_size(Some(250)), 10);
        assert_eq!(batch_size(Some(0)), 0);
    }
}
