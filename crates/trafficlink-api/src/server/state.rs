//! Shared server state.

use std::sync::Arc;

use trafficlink_commands::{CommandQueue, GatewaySettings, PollingGateway};
use trafficlink_devices::{DeviceRegistry, PreferenceStore};
use trafficlink_storage::Database;

/// Services handed to every handler. Each service holds the same database
/// handle, so cloning the state is cheap.
#[derive(Clone)]
pub struct ServerState {
    pub registry: DeviceRegistry,
    pub preferences: PreferenceStore,
    pub queue: CommandQueue,
    pub gateway: PollingGateway,
    /// Server start time (unix seconds).
    pub started_at: i64,
}

impl ServerState {
    pub fn new(db: Arc<Database>, settings: GatewaySettings) -> Self {
        let registry = DeviceRegistry::new(db.clone());
        let preferences = PreferenceStore::new(db.clone());
        let queue = CommandQueue::new(db);
        let gateway = PollingGateway::new(
            registry.clone(),
            queue.clone(),
            preferences.clone(),
            settings,
        );

        Self {
            registry,
            preferences,
            queue,
            gateway,
            started_at: chrono::Utc::now().timestamp(),
        }
    }
}
