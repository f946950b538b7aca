// Status and continuation commands
//
// Continuation commands answer only once the engine stops again, so they wait
// without a bound; termination still unblocks them.

use crate::commands::core_commands;
use crate::packet::ResponsePacket;
use crate::protocol::{DbgpError, DbgpResult};
use crate::session::DbgpSession;
use crate::types::{SessionStatus, StatusReason};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub status: SessionStatus,
    pub reason: StatusReason,
}

impl StatusInfo {
    fn from_response(response: &ResponsePacket) -> DbgpResult<Self> {
        let status = response
            .attr("status")
            .ok_or_else(|| DbgpError::Protocol(format!("{} response without status", response.command)))?
            .parse()?;
        let reason = match response.attr("reason") {
            Some(reason) => reason.parse()?,
            None => StatusReason::Ok,
        };
        Ok(Self { status, reason })
    }
}

impl DbgpSession {
    /// Current engine state (status command)
    pub async fn status(&self) -> DbgpResult<StatusInfo> {
        let request = self.create_request(core_commands::STATUS);
        let response = self.communicate(request).await?;
        StatusInfo::from_response(&response)
    }

    pub async fn run(&self) -> DbgpResult<StatusInfo> {
        self.continuation(core_commands::RUN).await
    }

    pub async fn step_into(&self) -> DbgpResult<StatusInfo> {
        self.continuation(core_commands::STEP_INTO).await
    }

    pub async fn step_over(&self) -> DbgpResult<StatusInfo> {
        self.continuation(core_commands::STEP_OVER).await
    }

    pub async fn step_out(&self) -> DbgpResult<StatusInfo> {
        self.continuation(core_commands::STEP_OUT).await
    }

    /// Ask the engine to end the debuggee
    pub async fn stop(&self) -> DbgpResult<StatusInfo> {
        self.continuation(core_commands::STOP).await
    }

    /// Let the debuggee run on without the debugger
    pub async fn detach(&self) -> DbgpResult<StatusInfo> {
        self.continuation(core_commands::DETACH).await
    }

    /// Interrupt a running debuggee. The engine reports the stop through the
    /// pending continuation's response.
    pub async fn break_execution(&self) -> DbgpResult<()> {
        let request = self.create_async_request(core_commands::BREAK);
        self.send(request).await
    }

    async fn continuation(&self, command: &str) -> DbgpResult<StatusInfo> {
        let request = self.create_request(command);
        let response = self.communicate_with_timeout(request, Duration::MAX).await?;
        StatusInfo::from_response(&response)
    }
}
