// DBGP command names
//
// Grouped the way the protocol document groups them

// Status and continuation commands
pub mod core_commands {
    pub const STATUS: &str = "status";
    pub const RUN: &str = "run";
    pub const STEP_INTO: &str = "step_into";
    pub const STEP_OVER: &str = "step_over";
    pub const STEP_OUT: &str = "step_out";
    pub const STOP: &str = "stop";
    pub const DETACH: &str = "detach";
    pub const BREAK: &str = "break";
}

pub mod feature_commands {
    pub const FEATURE_GET: &str = "feature_get";
    pub const FEATURE_SET: &str = "feature_set";
}

pub mod breakpoint_commands {
    pub const SET: &str = "breakpoint_set";
    pub const GET: &str = "breakpoint_get";
    pub const UPDATE: &str = "breakpoint_update";
    pub const REMOVE: &str = "breakpoint_remove";
    pub const LIST: &str = "breakpoint_list";
}

pub mod spawnpoint_commands {
    pub const SET: &str = "spawnpoint_set";
    pub const GET: &str = "spawnpoint_get";
    pub const UPDATE: &str = "spawnpoint_update";
    pub const REMOVE: &str = "spawnpoint_remove";
    pub const LIST: &str = "spawnpoint_list";
}

pub mod stack_commands {
    pub const STACK_DEPTH: &str = "stack_depth";
    pub const STACK_GET: &str = "stack_get";
}

pub mod context_commands {
    pub const CONTEXT_NAMES: &str = "context_names";
    pub const CONTEXT_GET: &str = "context_get";
}

pub mod property_commands {
    pub const PROPERTY_GET: &str = "property_get";
    pub const PROPERTY_SET: &str = "property_set";
    pub const PROPERTY_VALUE: &str = "property_value";
    pub const EVAL: &str = "eval";
}

pub mod data_commands {
    pub const SOURCE: &str = "source";
    pub const STDOUT: &str = "stdout";
    pub const STDERR: &str = "stderr";
}

// Feature names for feature_get / feature_set
pub mod features {
    pub const LANGUAGE_SUPPORTS_THREADS: &str = "language_supports_threads";
    pub const LANGUAGE_NAME: &str = "language_name";
    pub const LANGUAGE_VERSION: &str = "language_version";
    pub const ENCODING: &str = "encoding";
    pub const PROTOCOL_VERSION: &str = "protocol_version";
    pub const SUPPORTS_ASYNC: &str = "supports_async";
    pub const BREAKPOINT_TYPES: &str = "breakpoint_types";
    pub const MULTIPLE_SESSIONS: &str = "multiple_sessions";
    pub const MAX_CHILDREN: &str = "max_children";
    pub const MAX_DATA: &str = "max_data";
    pub const MAX_DEPTH: &str = "max_depth";
}

// Notify packet names
pub mod notifications {
    pub const BREAKPOINT_RESOLVED: &str = "breakpoint_resolved";
    pub const STDIN: &str = "stdin";
}
