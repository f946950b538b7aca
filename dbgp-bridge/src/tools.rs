// Method catalogue reported by `initialize`
//
// Every session method also accepts an optional `session_id`; without it the
// current session is used.

use crate::protocol::MethodInfo;
use serde_json::{json, Value};

pub const NOTIFICATIONS: &[&str] = &[
    "session/started",
    "session/notify",
    "session/output",
    "session/terminated",
];

fn method(name: &str, description: &str, params_schema: Value) -> MethodInfo {
    MethodInfo {
        name: name.to_string(),
        description: description.to_string(),
        params_schema,
    }
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": { "session_id": session_id_schema() } })
}

fn session_id_schema() -> Value {
    json!({ "type": "integer", "description": "Target session (defaults to the current one)" })
}

fn depth_schema() -> Value {
    json!({ "type": "integer", "description": "Stack depth, 0 is the innermost frame" })
}

pub fn get_methods() -> Vec<MethodInfo> {
    vec![
        method("initialize", "Handshake; returns this catalogue", json!({ "type": "object" })),
        method("sessions/list", "List connected engine sessions", json!({ "type": "object" })),
        method(
            "session/select",
            "Make a session current",
            json!({
                "type": "object",
                "properties": { "session_id": session_id_schema() },
                "required": ["session_id"]
            }),
        ),
        method("session/terminate", "Close a session's connection", no_params()),
        method(
            "spawnpoint/set",
            "Stop new execution contexts at a source line",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_schema(),
                    "uri": { "type": "string", "description": "File URI (e.g., 'file:///srv/app.tcl')" },
                    "line": { "type": "integer" },
                    "enabled": { "type": "boolean", "default": true }
                },
                "required": ["uri", "line"]
            }),
        ),
        method("spawnpoint/get", "Get a spawnpoint by id", id_params()),
        method("spawnpoint/list", "List spawnpoints", no_params()),
        method(
            "spawnpoint/update",
            "Enable, disable or move a spawnpoint",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_schema(),
                    "id": { "type": "string" },
                    "enabled": { "type": "boolean" },
                    "line": { "type": "integer" }
                },
                "required": ["id"]
            }),
        ),
        method("spawnpoint/remove", "Remove a spawnpoint", id_params()),
        method(
            "breakpoint/set",
            "Set a breakpoint",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_schema(),
                    "type": {
                        "type": "string",
                        "enum": ["line", "call", "return", "exception", "conditional", "watch"],
                        "default": "line"
                    },
                    "uri": { "type": "string" },
                    "line": { "type": "integer" },
                    "function": { "type": "string" },
                    "exception": { "type": "string" },
                    "expression": { "type": "string" },
                    "hit_value": { "type": "integer" },
                    "hit_condition": { "type": "string", "enum": [">=", "==", "%"] },
                    "temporary": { "type": "boolean", "default": false },
                    "enabled": { "type": "boolean", "default": true }
                }
            }),
        ),
        method("breakpoint/get", "Get a breakpoint by id", id_params()),
        method("breakpoint/list", "List breakpoints", no_params()),
        method(
            "breakpoint/update",
            "Change a breakpoint's state, line or hit condition",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_schema(),
                    "id": { "type": "string" },
                    "enabled": { "type": "boolean" },
                    "line": { "type": "integer" },
                    "hit_value": { "type": "integer" },
                    "hit_condition": { "type": "string", "enum": [">=", "==", "%"] }
                },
                "required": ["id"]
            }),
        ),
        method("breakpoint/remove", "Remove a breakpoint", id_params()),
        method("status", "Current engine state", no_params()),
        method("run", "Resume until the next breakpoint or the end", no_params()),
        method("step_into", "Step to the next statement, entering calls", no_params()),
        method("step_over", "Step to the next statement in this frame", no_params()),
        method("step_out", "Run until the current frame returns", no_params()),
        method("stop", "End the debuggee", no_params()),
        method("detach", "Let the debuggee continue without the debugger", no_params()),
        method(
            "stack/get",
            "Stack frames, all or one depth",
            json!({
                "type": "object",
                "properties": { "session_id": session_id_schema(), "depth": depth_schema() }
            }),
        ),
        method(
            "context/names",
            "Variable contexts available at a depth",
            json!({
                "type": "object",
                "properties": { "session_id": session_id_schema(), "depth": depth_schema() }
            }),
        ),
        method(
            "context/get",
            "Variables of one context",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_schema(),
                    "depth": depth_schema(),
                    "context_id": { "type": "integer", "default": 0 }
                }
            }),
        ),
        method(
            "property/get",
            "One variable and its children",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_schema(),
                    "name": { "type": "string", "description": "Full property name" },
                    "depth": depth_schema(),
                    "context_id": { "type": "integer" }
                },
                "required": ["name"]
            }),
        ),
        method(
            "eval",
            "Evaluate an expression in the current frame",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_schema(),
                    "expression": { "type": "string" }
                },
                "required": ["expression"]
            }),
        ),
        method(
            "source",
            "Source text of a file, optionally a line range",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_schema(),
                    "uri": { "type": "string" },
                    "begin": { "type": "integer" },
                    "end": { "type": "integer" }
                }
            }),
        ),
    ]
}

fn id_params() -> Value {
    json!({
        "type": "object",
        "properties": { "session_id": session_id_schema(), "id": { "type": "string" } },
        "required": ["id"]
    })
}
