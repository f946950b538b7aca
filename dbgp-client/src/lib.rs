// DBGP client library for debugging script interpreters
//
// Talks to out-of-process engines (PHP, Python, Tcl, Ruby...) over the DBGP
// wire protocol:
// - Framing and packet classification
// - Transaction-correlated request/response
// - Breakpoint and spawnpoint management
// - Stack, context and property inspection
// - Session termination

pub mod codec;
pub mod commands;
pub mod config;
pub mod lifecycle;
pub mod observer;
pub mod packet;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod session;
pub mod transaction;
pub mod types;
pub mod xml;

pub mod breakpoint;
pub mod feature;
pub mod property;
pub mod source;
pub mod spawnpoint;
pub mod stack;
pub mod status;

#[cfg(test)]
mod testing;

pub use breakpoint::{Breakpoint, BreakpointSpec, BreakpointUpdate};
pub use codec::Request;
pub use config::DbgpConfig;
pub use feature::FeatureValue;
pub use lifecycle::SessionState;
pub use observer::{PacketLogger, TerminationListener, TracingPacketLogger};
pub use packet::{InitPacket, NotifyPacket, ResponsePacket, StreamPacket};
pub use property::{ContextInfo, Property};
pub use protocol::{DbgpError, DbgpResult};
pub use server::DbgpServer;
pub use session::DbgpSession;
pub use spawnpoint::Spawnpoint;
pub use stack::StackLevel;
pub use status::StatusInfo;
pub use transaction::TransactionManager;
pub use types::{BreakpointType, HitCondition, SessionStatus, StatusReason, StreamKind, StreamMode};
