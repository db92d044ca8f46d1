//! Command vocabulary and lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kinds of command a device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Open a priority corridor at the controlled intersection.
    OpenCorridor,
}

impl CommandType {
    pub const ALL: &'static [CommandType] = &[CommandType::OpenCorridor];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::OpenCorridor => "open_corridor",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = CommandType::ALL.iter().map(|t| t.as_str()).collect();
                Error::validation(
                    "commandType",
                    format!("unknown command type '{}', expected one of: {}", s, allowed.join(", ")),
                )
            })
    }
}

/// Lifecycle state of a command.
///
/// `Pending` is the only non-terminal state. A command leaves it exactly once,
/// for either `Executed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Executed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Executed => "executed",
            CommandStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Pending)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (CommandStatus::Pending, CommandStatus::Executed)
                | (CommandStatus::Pending, CommandStatus::Failed)
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
