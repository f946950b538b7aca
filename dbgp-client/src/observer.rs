// Packet logging and termination observers

use crate::codec::Request;
use crate::protocol::DbgpError;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// Sees every packet crossing the wire, for diagnostics views.
pub trait PacketLogger: Send + Sync {
    fn packet_sent(&self, _session_id: u64, _request: &Request) {}

    /// Called with the payload text before the packet is classified. This is
    /// the text the parser sees: invalid UTF-8 from the engine has already been
    /// replaced with U+FFFD.
    fn packet_received(&self, _session_id: u64, _raw: &str) {}
}

/// Called exactly once when a session's receiver loop has exited.
pub trait TerminationListener: Send + Sync {
    fn terminated(&self, session_id: u64, error: Option<&DbgpError>);
}

impl<F> TerminationListener for F
where
    F: Fn(u64, Option<&DbgpError>) + Send + Sync,
{
    fn terminated(&self, session_id: u64, error: Option<&DbgpError>) {
        self(session_id, error)
    }
}

/// Routes raw packets to `tracing` at trace level
#[derive(Debug, Default)]
pub struct TracingPacketLogger;

impl PacketLogger for TracingPacketLogger {
    fn packet_sent(&self, session_id: u64, request: &Request) {
        trace!("[session {}] >> {}", session_id, request);
    }

    fn packet_received(&self, session_id: u64, raw: &str) {
        trace!("[session {}] << {}", session_id, raw);
    }
}

/// Shared set of packet loggers, cloned into the sender and the receiver
#[derive(Clone, Default)]
pub struct PacketLoggers {
    loggers: Arc<RwLock<Vec<Arc<dyn PacketLogger>>>>,
}

impl PacketLoggers {
    pub fn add(&self, logger: Arc<dyn PacketLogger>) {
        self.loggers.write().push(logger);
    }

    pub fn remove(&self, logger: &Arc<dyn PacketLogger>) {
        self.loggers.write().retain(|l| !Arc::ptr_eq(l, logger));
    }

    pub fn len(&self) -> usize {
        self.loggers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sent(&self, session_id: u64, request: &Request) {
        for logger in self.loggers.read().iter() {
            logger.packet_sent(session_id, request);
        }
    }

    pub fn received(&self, session_id: u64, raw: &str) {
        for logger in self.loggers.read().iter() {
            logger.packet_received(session_id, raw);
        }
    }
}

impl std::fmt::Debug for PacketLoggers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketLoggers")
            .field("count", &self.len())
            .finish()
    }
}
