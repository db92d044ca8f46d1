//! Command system for field devices.
//!
//! Provides:
//! - Command vocabulary and outcome parsing
//! - The durable command queue with its one-shot state machine
//! - The polling gateway devices talk to

pub mod command;
pub mod gateway;
pub mod queue;

pub use command::{parse_command_id, Command, CommandId, CommandOutcome, CommandStatus, CommandType};
pub use gateway::{GatewaySettings, PollingGateway};
pub use queue::CommandQueue;
