//! Device registry and preference services.
//!
//! The registry is the only component that creates devices; every other
//! service asks it (or the storage layer's in-transaction checks) whether a
//! device exists before touching data keyed by the device id.

pub mod preferences;
pub mod registry;

pub use preferences::{PreferenceStore, PreferenceUpdate};
pub use registry::{DeviceRegistry, NewDevice};
pub use trafficlink_storage::{DeviceRecord, PreferenceRecord};
