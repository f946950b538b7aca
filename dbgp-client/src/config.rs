// Session configuration

use crate::protocol::MAX_PACKET_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbgpConfig {
    /// Default bound on waiting for a command's response
    pub response_timeout_ms: u64,
    /// Per-read timeout while reading a packet payload. `None` blocks until data arrives.
    pub read_timeout_ms: Option<u64>,
    pub max_packet_size: usize,
    /// Bound on waiting for the engine's init packet
    pub handshake_timeout_ms: u64,
}

impl Default for DbgpConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 10_000,
            read_timeout_ms: None,
            max_packet_size: MAX_PACKET_SIZE,
            handshake_timeout_ms: 5_000,
        }
    }
}

impl DbgpConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
