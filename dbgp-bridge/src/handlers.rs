// JSON-RPC request handlers
//
// Handles initialize, session selection and the debug commands, each routed to
// the requested (or current) DBGP session.

use crate::protocol::*;
use crate::session::{SessionId, SessionManager};
use crate::tools;
use dbgp_client::{
    BreakpointSpec, BreakpointType, BreakpointUpdate, DbgpError, DbgpSession, HitCondition,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

type HandlerResult = Result<Value, JsonRpcError>;

impl From<DbgpError> for JsonRpcError {
    fn from(error: DbgpError) -> Self {
        let message = error.to_string();
        // Tells the client whether the session can still serve commands
        let recoverable = error.is_recoverable();
        let (code, data) = match error {
            DbgpError::Remote { code, message: remote } => (
                REMOTE_ERROR,
                json!({ "code": code, "message": remote, "recoverable": recoverable }),
            ),
            DbgpError::Timeout(_) => (TIMEOUT_ERROR, json!({ "recoverable": recoverable })),
            DbgpError::Terminated => (SESSION_TERMINATED, json!({ "recoverable": recoverable })),
            DbgpError::Transport(_) | DbgpError::Protocol(_) => {
                (INTERNAL_ERROR, json!({ "recoverable": recoverable }))
            }
        };
        JsonRpcError {
            code,
            message,
            data: Some(data),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn to_json<T: Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Failed to serialize result: {}", e)))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct TargetParams {
    session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
struct SelectParams {
    session_id: SessionId,
}

#[derive(Debug, Deserialize)]
struct IdParams {
    session_id: Option<SessionId>,
    id: String,
}

#[derive(Debug, Deserialize)]
struct SpawnpointSetParams {
    session_id: Option<SessionId>,
    uri: String,
    line: u32,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct SpawnpointUpdateParams {
    session_id: Option<SessionId>,
    id: String,
    enabled: Option<bool>,
    line: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct BreakpointSetParams {
    session_id: Option<SessionId>,
    #[serde(rename = "type")]
    breakpoint_type: Option<BreakpointType>,
    uri: Option<String>,
    line: Option<u32>,
    function: Option<String>,
    exception: Option<String>,
    expression: Option<String>,
    hit_value: Option<u32>,
    hit_condition: Option<HitCondition>,
    #[serde(default)]
    temporary: bool,
    #[serde(default = "default_true")]
    enabled: bool,
}

impl BreakpointSetParams {
    fn into_spec(self) -> Result<BreakpointSpec, JsonRpcError> {
        let breakpoint_type = self.breakpoint_type.unwrap_or(BreakpointType::Line);
        let missing = |field: &str| {
            JsonRpcError::invalid_params(format!("'{}' breakpoints need '{}'", breakpoint_type, field))
        };

        match breakpoint_type {
            BreakpointType::Line if self.uri.is_none() => return Err(missing("uri")),
            BreakpointType::Line if self.line.is_none() => return Err(missing("line")),
            BreakpointType::Call | BreakpointType::Return if self.function.is_none() => {
                return Err(missing("function"))
            }
            BreakpointType::Exception if self.exception.is_none() => return Err(missing("exception")),
            BreakpointType::Conditional | BreakpointType::Watch if self.expression.is_none() => {
                return Err(missing("expression"))
            }
            _ => {}
        }

        Ok(BreakpointSpec {
            breakpoint_type,
            enabled: self.enabled,
            filename: self.uri,
            line_number: self.line,
            function: self.function,
            exception: self.exception,
            hit_value: self.hit_value,
            hit_condition: self.hit_condition,
            temporary: self.temporary,
            expression: self.expression,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BreakpointUpdateParams {
    session_id: Option<SessionId>,
    id: String,
    enabled: Option<bool>,
    line: Option<u32>,
    hit_value: Option<u32>,
    hit_condition: Option<HitCondition>,
}

#[derive(Debug, Deserialize)]
struct DepthParams {
    session_id: Option<SessionId>,
    depth: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ContextGetParams {
    session_id: Option<SessionId>,
    depth: Option<u32>,
    context_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PropertyGetParams {
    session_id: Option<SessionId>,
    name: String,
    depth: Option<u32>,
    context_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EvalParams {
    session_id: Option<SessionId>,
    expression: String,
}

#[derive(Debug, Deserialize)]
struct SourceParams {
    session_id: Option<SessionId>,
    uri: Option<String>,
    begin: Option<u32>,
    end: Option<u32>,
}

pub struct RequestHandler {
    session_manager: SessionManager,
    listen_address: String,
}

impl RequestHandler {
    pub fn new(session_manager: SessionManager, listen_address: String) -> Self {
        Self {
            session_manager,
            listen_address,
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling {}", request.method);
        let params = request.params;

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(params),
            "sessions/list" => self.handle_list_sessions().await,
            "session/select" => self.handle_select(params).await,
            "session/terminate" => self.handle_terminate(params).await,

            "spawnpoint/set" => self.handle_spawnpoint_set(params).await,
            "spawnpoint/get" => self.handle_spawnpoint_get(params).await,
            "spawnpoint/list" => self.handle_spawnpoint_list(params).await,
            "spawnpoint/update" => self.handle_spawnpoint_update(params).await,
            "spawnpoint/remove" => self.handle_spawnpoint_remove(params).await,

            "breakpoint/set" => self.handle_breakpoint_set(params).await,
            "breakpoint/get" => self.handle_breakpoint_get(params).await,
            "breakpoint/list" => self.handle_breakpoint_list(params).await,
            "breakpoint/update" => self.handle_breakpoint_update(params).await,
            "breakpoint/remove" => self.handle_breakpoint_remove(params).await,

            "status" | "run" | "step_into" | "step_over" | "step_out" | "stop" | "detach" => {
                self.handle_execution(&request.method, params).await
            }

            "stack/get" => self.handle_stack_get(params).await,
            "context/names" => self.handle_context_names(params).await,
            "context/get" => self.handle_context_get(params).await,
            "property/get" => self.handle_property_get(params).await,
            "eval" => self.handle_eval(params).await,
            "source" => self.handle_source(params).await,

            _ => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::failure(request.id, error),
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" => info!("Client initialized"),
            "$/cancelRequest" => debug!("Request cancelled"),
            _ => warn!("Unknown notification: {}", notification.method),
        }
    }

    async fn session(&self, session_id: Option<SessionId>) -> Result<Arc<DbgpSession>, JsonRpcError> {
        self.session_manager.get_session(session_id).await.ok_or_else(|| {
            let message = match session_id {
                Some(id) => format!("No session {}", id),
                None => "No active debug session. Start an engine against the bridge first.".to_string(),
            };
            JsonRpcError::new(NO_SESSION, message)
        })
    }

    fn handle_initialize(&self, params: Option<Value>) -> HandlerResult {
        let _params: InitializeParams = parse_params(params)?;

        to_json(InitializeResult {
            server_info: ServerInfo {
                name: "dbgp-bridge".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            listen_address: self.listen_address.clone(),
            methods: tools::get_methods(),
            notifications: tools::NOTIFICATIONS.to_vec(),
        })
    }

    async fn handle_list_sessions(&self) -> HandlerResult {
        let current = self.session_manager.get_current_session_id().await;
        let sessions: Vec<Value> = self
            .session_manager
            .list_sessions()
            .await
            .iter()
            .map(|s| {
                json!({
                    "session_id": s.id(),
                    "current": Some(s.id()) == current,
                    "state": s.state(),
                    "init": s.init_packet(),
                })
            })
            .collect();
        Ok(json!({ "sessions": sessions }))
    }

    async fn handle_select(&self, params: Option<Value>) -> HandlerResult {
        let params: SelectParams = parse_params(params)?;
        if !self.session_manager.select(params.session_id).await {
            return Err(JsonRpcError::new(NO_SESSION, format!("No session {}", params.session_id)));
        }
        Ok(json!({ "session_id": params.session_id }))
    }

    async fn handle_terminate(&self, params: Option<Value>) -> HandlerResult {
        let params: TargetParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        session.request_termination().await;
        Ok(json!({ "session_id": session.id() }))
    }

    async fn handle_spawnpoint_set(&self, params: Option<Value>) -> HandlerResult {
        let params: SpawnpointSetParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        let spawnpoint = session
            .set_spawnpoint(&params.uri, params.line, params.enabled)
            .await?;
        to_json(spawnpoint)
    }

    async fn handle_spawnpoint_get(&self, params: Option<Value>) -> HandlerResult {
        let params: IdParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(session.get_spawnpoint(&params.id).await?)
    }

    async fn handle_spawnpoint_list(&self, params: Option<Value>) -> HandlerResult {
        let params: TargetParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(session.list_spawnpoints().await?)
    }

    async fn handle_spawnpoint_update(&self, params: Option<Value>) -> HandlerResult {
        let params: SpawnpointUpdateParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        session
            .update_spawnpoint(&params.id, params.enabled, params.line)
            .await?;
        Ok(json!({ "id": params.id }))
    }

    async fn handle_spawnpoint_remove(&self, params: Option<Value>) -> HandlerResult {
        let params: IdParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        session.remove_spawnpoint(&params.id).await?;
        Ok(json!({ "id": params.id }))
    }

    async fn handle_breakpoint_set(&self, params: Option<Value>) -> HandlerResult {
        let params: BreakpointSetParams = parse_params(params)?;
        let session_id = params.session_id;
        let spec = params.into_spec()?;
        let session = self.session(session_id).await?;
        to_json(session.set_breakpoint(&spec).await?)
    }

    async fn handle_breakpoint_get(&self, params: Option<Value>) -> HandlerResult {
        let params: IdParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(session.get_breakpoint(&params.id).await?)
    }

    async fn handle_breakpoint_list(&self, params: Option<Value>) -> HandlerResult {
        let params: TargetParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(session.list_breakpoints().await?)
    }

    async fn handle_breakpoint_update(&self, params: Option<Value>) -> HandlerResult {
        let params: BreakpointUpdateParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        let update = BreakpointUpdate {
            enabled: params.enabled,
            line_number: params.line,
            hit_value: params.hit_value,
            hit_condition: params.hit_condition,
        };
        session.update_breakpoint(&params.id, &update).await?;
        Ok(json!({ "id": params.id }))
    }

    async fn handle_breakpoint_remove(&self, params: Option<Value>) -> HandlerResult {
        let params: IdParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        session.remove_breakpoint(&params.id).await?;
        Ok(json!({ "id": params.id }))
    }

    async fn handle_execution(&self, method: &str, params: Option<Value>) -> HandlerResult {
        let params: TargetParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;

        let status = match method {
            "run" => session.run().await?,
            "step_into" => session.step_into().await?,
            "step_over" => session.step_over().await?,
            "step_out" => session.step_out().await?,
            "stop" => session.stop().await?,
            "detach" => session.detach().await?,
            _ => session.status().await?,
        };
        to_json(status)
    }

    async fn handle_stack_get(&self, params: Option<Value>) -> HandlerResult {
        let params: DepthParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(session.stack_get(params.depth).await?)
    }

    async fn handle_context_names(&self, params: Option<Value>) -> HandlerResult {
        let params: DepthParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(session.context_names(params.depth).await?)
    }

    async fn handle_context_get(&self, params: Option<Value>) -> HandlerResult {
        let params: ContextGetParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(session.context_get(params.depth, params.context_id).await?)
    }

    async fn handle_property_get(&self, params: Option<Value>) -> HandlerResult {
        let params: PropertyGetParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(
            session
                .property_get(&params.name, params.depth, params.context_id)
                .await?,
        )
    }

    async fn handle_eval(&self, params: Option<Value>) -> HandlerResult {
        let params: EvalParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        to_json(session.eval(&params.expression).await?)
    }

    async fn handle_source(&self, params: Option<Value>) -> HandlerResult {
        let params: SourceParams = parse_params(params)?;
        let session = self.session(params.session_id).await?;
        let source = session
            .source(params.uri.as_deref(), params.begin, params.end)
            .await?;
        Ok(json!({ "source": source }))
    }
}
