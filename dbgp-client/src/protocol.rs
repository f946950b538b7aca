// DBGP protocol definitions and error taxonomy
//
// Reference: https://xdebug.org/docs/dbgp

use thiserror::Error;

pub type DbgpResult<T> = Result<T, DbgpError>;

/// The single error type surfaced by every session command.
#[derive(Debug, Error)]
pub enum DbgpError {
    /// Socket I/O failure on send or receive. Always fatal to the session.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed XML or an unexpected packet shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The debugger engine answered with an `<error>` element.
    #[error("DBGP error code {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Timed out waiting for response to transaction {0}")]
    Timeout(u32),

    #[error("Session terminated")]
    Terminated,
}

impl DbgpError {
    pub fn protocol(message: impl Into<String>) -> Self {
        DbgpError::Protocol(message.into())
    }

    /// Errors after which the session can keep serving commands.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DbgpError::Protocol(_) | DbgpError::Remote { .. } | DbgpError::Timeout(_)
        )
    }
}

// Wire framing:
// inbound  = 10 ASCII decimal digits (payload length) + UTF-8 XML payload
// outbound = command\n(flag\nvalue\n)*(arg\n)*\0

pub const LENGTH_FIELD_WIDTH: usize = 10;
pub const COMMAND_TERMINATOR: u8 = 0x00;

/// Maximum allowed DBGP payload size (10MB)
pub const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// Default IDE listening port for DBGP engines
pub const DEFAULT_PORT: u16 = 9000;

/// Standard message for a DBGP error code, used when the engine omits `<message>`.
pub fn error_message(code: i32) -> &'static str {
    match code {
        0 => "no error",
        1 => "parse error in command",
        2 => "duplicate arguments in command",
        3 => "invalid or missing options",
        4 => "unimplemented command",
        5 => "command is not available",
        100 => "can not open file",
        101 => "stream redirect failed",
        200 => "breakpoint could not be set",
        201 => "breakpoint type not supported",
        202 => "invalid breakpoint",
        203 => "no code on breakpoint line",
        204 => "invalid breakpoint state",
        205 => "no such breakpoint",
        206 => "error evaluating code",
        207 => "invalid expression",
        208 => "spawnpoint could not be set",
        300 => "can not get property",
        301 => "stack depth invalid",
        302 => "context invalid",
        303 => "unknown or unsupported encoding",
        304 => "property does not exist",
        900 => "encoding not supported",
        998 => "an internal exception in the debugger occurred",
        999 => "unknown error",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_table() {
        assert_eq!(error_message(4), "unimplemented command");
        assert_eq!(error_message(205), "no such breakpoint");
        assert_eq!(error_message(12345), "unknown error");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(DbgpError::Timeout(1).is_recoverable());
        assert!(DbgpError::protocol("bad").is_recoverable());
        assert!(DbgpError::Remote { code: 5, message: "x".into() }.is_recoverable());
        assert!(!DbgpError::Terminated.is_recoverable());

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(!DbgpError::from(io).is_recoverable());
    }

    #[test]
    fn test_remote_error_display() {
        let err = DbgpError::Remote {
            code: 205,
            message: "no such breakpoint".to_string(),
        };
        assert_eq!(err.to_string(), "DBGP error code 205: no such breakpoint");
    }
}
