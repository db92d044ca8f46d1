//! Core types for TrafficLink.
//!
//! This crate holds what every other crate agrees on: the error taxonomy,
//! the command vocabulary and the layered application configuration.

pub mod command;
pub mod config;
pub mod error;

pub use command::{CommandStatus, CommandType};
pub use config::AppConfig;
pub use error::{Error, ErrorKind, Result};
