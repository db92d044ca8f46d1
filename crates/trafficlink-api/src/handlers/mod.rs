//! HTTP handlers.

pub mod basic;
pub mod commands;
pub mod common;
pub mod devices;
pub mod preferences;

pub use crate::server::ServerState;
