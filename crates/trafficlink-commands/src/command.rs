//! Command data structures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trafficlink_core::{validation_err, Error};

pub use trafficlink_core::{CommandStatus, CommandType};

/// A queued command as stored and as returned to callers.
pub type Command = trafficlink_storage::CommandRecord;

/// Command identifier.
pub type CommandId = u64;

/// Terminal result a device reports for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The device carried the command out.
    Executed,
    /// The device tried and gave up.
    Failed,
}

impl CommandOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandOutcome::Executed => "executed",
            CommandOutcome::Failed => "failed",
        }
    }
}

impl From<CommandOutcome> for CommandStatus {
    fn from(outcome: CommandOutcome) -> Self {
        match outcome {
            CommandOutcome::Executed => CommandStatus::Executed,
            CommandOutcome::Failed => CommandStatus::Failed,
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executed" => Ok(CommandOutcome::Executed),
            "failed" => Ok(CommandOutcome::Failed),
            other => Err(validation_err!(
                "status",
                "expected 'executed' or 'failed', got '{}'",
                other
            )),
        }
    }
}

/// Parse a command id received as text: a positive base-10 integer.
pub fn parse_command_id(raw: &str) -> Result<CommandId, Error> {
    let invalid = || validation_err!("commandId", "'{}' is not a valid command id", raw);

    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match raw.parse::<CommandId>() {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(id) => Ok(id),
    }
}
