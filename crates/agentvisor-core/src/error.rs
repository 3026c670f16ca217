//! Error types for Agentvisor Core

use thiserror::Error;

/// Main error type for Agentvisor operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Agent lifecycle errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Agent '{0}' is not running or not found")]
    NotRunning(String),

    #[error("Agent '{0}' not found")]
    NotFound(String),

    #[error("Configuration for agent '{id}' not found at path: {path}")]
    ConfigNotFound { id: String, path: String },

    #[error("Failed to launch agent '{id}': {reason}")]
    LaunchFailed { id: String, reason: String },

    #[error("Failed to stop agent '{id}' (PID {pid}): {reason}")]
    StopFailed { id: String, pid: u32, reason: String },

    #[error("Failed to write configuration for agent '{id}' to '{path}': {reason}")]
    WriteFailed {
        id: String,
        path: String,
        reason: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl AgentError {
    /// Stable machine-readable tag for this failure
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRunning(_) => "already_running",
            Self::NotRunning(_) => "not_running",
            Self::NotFound(_) => "not_found",
            Self::ConfigNotFound { .. } => "config_not_found",
            Self::LaunchFailed { .. } => "launch_error",
            Self::StopFailed { .. } => "stop_error",
            Self::WriteFailed { .. } => "write_error",
            Self::InvalidArgument(_) => "invalid_argument",
        }
    }

    /// Agent ID the failure refers to, when there is one
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::AlreadyRunning(id) | Self::NotRunning(id) | Self::NotFound(id) => Some(id),
            Self::ConfigNotFound { id, .. }
            | Self::LaunchFailed { id, .. }
            | Self::StopFailed { id, .. }
            | Self::WriteFailed { id, .. } => Some(id),
            Self::InvalidArgument(_) => None,
        }
    }
}

/// JSON-RPC transport errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
