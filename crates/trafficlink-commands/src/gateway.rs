//! Polling gateway: the protocol surface devices talk to.
//!
//! Devices cannot hold connections open, so every exchange is a short
//! request: poll for pending work, report the outcome of each command, pull
//! preferences. The gateway verifies who is asking and delegates to the
//! registry, the queue and the preference store.

use std::time::Duration;

use tracing::{debug, warn};
use trafficlink_core::config::polling;
use trafficlink_core::{not_found_err, AppConfig, Error, Result};
use trafficlink_devices::{DeviceRecord, DeviceRegistry, PreferenceRecord, PreferenceStore};

use crate::command::{parse_command_id, Command, CommandOutcome};
use crate::queue::CommandQueue;

/// Gateway behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Commands handed out per poll, at most 10.
    pub batch_limit: usize,
    /// Lease placed on polled commands. `None` hands out pending commands
    /// without claiming them.
    pub claim_lease: Option<Duration>,
    /// Require the device's API key on every call.
    pub require_device_key: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            batch_limit: polling::MAX_BATCH,
            claim_lease: Some(Duration::from_secs(polling::DEFAULT_CLAIM_LEASE_SECS)),
            require_device_key: true,
        }
    }
}

impl From<&AppConfig> for GatewaySettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_limit: config.polling.effective_batch_limit(),
            claim_lease: config.polling.claim_lease(),
            require_device_key: config.auth.require_device_key,
        }
    }
}

/// Device-facing protocol adapter.
#[derive(Debug, Clone)]
pub struct PollingGateway {
    registry: DeviceRegistry,
    queue: CommandQueue,
    preferences: PreferenceStore,
    settings: GatewaySettings,
}

impl PollingGateway {
    pub fn new(
        registry: DeviceRegistry,
        queue: CommandQueue,
        preferences: PreferenceStore,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            registry,
            queue,
            preferences,
            settings,
        }
    }

    /// Hand the device its next batch of pending commands, oldest first.
    pub fn poll(&self, device_id: &str, presented_key: Option<&str>) -> Result<Vec<Command>> {
        self.identify(device_id, presented_key)?;

        let limit = Some(self.settings.batch_limit);
        let batch = match self.settings.claim_lease {
            Some(lease) => self.queue.claim_pending(device_id, limit, lease)?,
            None => self.queue.list_pending(device_id, limit)?,
        };

        self.registry.touch(device_id);
        debug!(device_id, count = batch.len(), "Device polled");
        Ok(batch)
    }

    /// Apply a device's outcome report. `command_id` is the raw identifier as
    /// it arrived on the wire.
    pub fn report(
        &self,
        command_id: &str,
        status: &str,
        presented_key: Option<&str>,
    ) -> Result<Command> {
        let id = parse_command_id(command_id)?;
        let outcome: CommandOutcome = status.parse()?;

        if self.settings.require_device_key {
            let device = self.authenticate(presented_key)?;
            let command = self.queue.get(id)?;
            if command.device_id != device.device_id {
                warn!(
                    command_id = id,
                    owner = %command.device_id,
                    caller = %device.device_id,
                    "Outcome reported by a device that does not own the command"
                );
                return Err(Error::unauthorized(format!(
                    "command {} does not belong to device {}",
                    id, device.device_id
                )));
            }
        }

        self.queue.report_outcome(id, outcome)
    }

    /// Device-side preference pull.
    pub fn sync_preferences(
        &self,
        device_id: &str,
        presented_key: Option<&str>,
    ) -> Result<PreferenceRecord> {
        self.identify(device_id, presented_key)?;
        let prefs = self.preferences.sync(device_id)?;
        self.registry.touch(device_id);
        Ok(prefs)
    }

    /// Check that `device_id` is a registered device and, when keys are
    /// required, that the caller holds its key.
    fn identify(&self, device_id: &str, presented_key: Option<&str>) -> Result<()> {
        if self.settings.require_device_key {
            let device = self.authenticate(presented_key)?;
            if device.device_id != device_id {
                return Err(Error::unauthorized(format!(
                    "key does not belong to device {}",
                    device_id
                )));
            }
            return Ok(());
        }

        if !self.registry.exists(device_id)? {
            return Err(not_found_err!("device {}", device_id));
        }
        Ok(())
    }

    fn authenticate(&self, presented_key: Option<&str>) -> Result<DeviceRecord> {
        match presented_key {
            Some(key) if !key.is_empty() => self.registry.authenticate(key),
            _ => Err(Error::unauthorized("device key required")),
        }
    }
}
