//! Durable storage for TrafficLink, backed by a single redb file.
//!
//! One [`Database`] handle is opened at startup and shared by `Arc` with the
//! per-entity stores. Every mutation runs in a redb write transaction, and redb
//! admits one writer at a time, so conditional updates (read, check, write)
//! inside a transaction are atomic with respect to each other.

pub mod commands;
pub mod database;
pub mod device_registry;
pub mod error;
pub mod preferences;

pub use commands::{CommandRecord, CommandStore, TransitionOutcome};
pub use database::Database;
pub use device_registry::{DeviceRecord, DeviceStore, InsertOutcome};
pub use error::{Error, Result};
pub use preferences::{PreferencePatch, PreferenceRecord, PrefsStore};
