// DBGP type definitions
//
// Enumerated attribute values shared across commands

use crate::protocol::{DbgpError, DbgpResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Implements `as_str`, `Display` and `FromStr` for a wire-encoded enum
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DbgpError;

            fn from_str(s: &str) -> DbgpResult<Self> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(DbgpError::Protocol(format!(
                        "Unknown {} value '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

// Engine execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Stopping,
    Stopped,
    Running,
    Break,
}

wire_enum!(SessionStatus {
    Starting => "starting",
    Stopping => "stopping",
    Stopped => "stopped",
    Running => "running",
    Break => "break",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusReason {
    Ok,
    Error,
    Aborted,
    Exception,
}

wire_enum!(StatusReason {
    Ok => "ok",
    Error => "error",
    Aborted => "aborted",
    Exception => "exception",
});

// Stream packet origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

wire_enum!(StreamKind {
    Stdout => "stdout",
    Stderr => "stderr",
});

// stdout/stderr redirection mode (-c option)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Disable,
    Copy,
    Redirect,
}

impl StreamMode {
    pub fn code(&self) -> u8 {
        match self {
            StreamMode::Disable => 0,
            StreamMode::Copy => 1,
            StreamMode::Redirect => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointType {
    Line,
    Call,
    Return,
    Exception,
    Conditional,
    Watch,
}

wire_enum!(BreakpointType {
    Line => "line",
    Call => "call",
    Return => "return",
    Exception => "exception",
    Conditional => "conditional",
    Watch => "watch",
});

// Hit condition operator (-o option)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitCondition {
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "%")]
    Multiple,
}

wire_enum!(HitCondition {
    GreaterOrEqual => ">=",
    Equal => "==",
    Multiple => "%",
});

/// Encode an enabled flag the way `-s` expects it
pub fn state_str(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

/// Decode a `state` attribute; anything but "disabled" counts as enabled
pub fn parse_state(state: Option<&str>) -> bool {
    state != Some("disabled")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_enum_round_trip() {
        assert_eq!("break".parse::<SessionStatus>().unwrap(), SessionStatus::Break);
        assert_eq!(SessionStatus::Stopping.as_str(), "stopping");
        assert_eq!(HitCondition::Multiple.to_string(), "%");
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_state_encoding() {
        assert_eq!(state_str(true), "enabled");
        assert!(!parse_state(Some("disabled")));
        assert!(parse_state(Some("enabled")));
        assert!(parse_state(None));
    }
}
