//! Routes JSON-RPC requests to lifecycle operations

use super::tools::{self, tool_descriptors};
use crate::agent::AgentManager;
use crate::error::{Error, Result, RpcError};
use crate::types::*;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const SERVER_NAME: &str = "agentvisor";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: &str = "2024-11-05";
const INSTRUCTIONS: &str =
    "This server starts, stops, reconfigures and reports on agent processes.";

/// Handles one request at a time; cheap to share between request tasks
#[derive(Clone)]
pub struct ToolDispatcher {
    manager: Arc<AgentManager>,
}

impl ToolDispatcher {
    pub fn new(manager: Arc<AgentManager>) -> Self {
        Self { manager }
    }

    /// Handle one raw line; `None` when no response is due
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping malformed request: {}", e);
                return Some(error_response(None, &RpcError::Parse(e.to_string()).into()));
            }
        };
        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if request.jsonrpc != "2.0" {
            let err = RpcError::InvalidRequest(format!(
                "unsupported jsonrpc version '{}'",
                request.jsonrpc
            ));
            return request.id.map(|id| error_response(Some(id), &err.into()));
        }

        let is_notification = request.is_notification();
        let result = self.route(&request.method, request.params).await;

        if is_notification {
            if let Err(e) = result {
                debug!("Notification {} failed: {}", request.method, e);
            }
            return None;
        }

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => error_response(request.id, &e),
        })
    }

    async fn route(&self, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                "capabilities": { "tools": {} },
                "instructions": INSTRUCTIONS,
            })),
            "notifications/initialized" | "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_descriptors() })),
            "tools/call" => {
                let params: ToolCallParams = serde_json::from_value(params.unwrap_or(Value::Null))
                    .map_err(|e| RpcError::InvalidParams(e.to_string()))?;
                let data = self.call_tool(&params.name, &params.arguments).await?;
                Ok(tool_result(data))
            }
            other => Err(RpcError::MethodNotFound(other.to_string()).into()),
        }
    }

    /// Run one tool and return its structured result
    pub async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        match name {
            tools::RUN_AGENT => {
                to_value(self.manager.start(required_str(args, "agent_id")?).await?)
            }
            tools::STOP_AGENT => {
                to_value(self.manager.stop(required_str(args, "agent_id")?).await?)
            }
            tools::GET_AGENT_STATUS => {
                to_value(self.manager.status(required_str(args, "agent_id")?).await?)
            }
            tools::UPDATE_AGENT_CONFIG => {
                let agent_id = required_str(args, "agent_id")?;
                let config_data = required_str(args, "config_data")?;
                to_value(self.manager.update_config(agent_id, config_data).await?)
            }
            tools::LIST_AGENTS => to_value(self.manager.list().await),
            other => Err(RpcError::UnknownTool(other.to_string()).into()),
        }
    }
}

fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| {
        RpcError::InvalidParams(format!("missing or invalid parameter '{}'", key)).into()
    })
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Wrap structured data in a tool-call result
fn tool_result(data: Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": data.to_string() }],
        "structuredContent": data,
        "isError": false,
    })
}

/// Map an error onto a JSON-RPC error object
pub fn error_response(id: Option<Value>, err: &Error) -> JsonRpcResponse {
    let (code, data) = match err {
        Error::Rpc(RpcError::Parse(_)) => (PARSE_ERROR, None),
        Error::Rpc(RpcError::InvalidRequest(_)) => (INVALID_REQUEST, None),
        Error::Rpc(RpcError::MethodNotFound(_)) => (METHOD_NOT_FOUND, None),
        Error::Rpc(RpcError::InvalidParams(_)) | Error::Rpc(RpcError::UnknownTool(_)) => {
            (INVALID_PARAMS, Some(json!({ "kind": "invalid_argument" })))
        }
        Error::Agent(agent_err) => {
            let code = match agent_err {
                crate::error::AgentError::InvalidArgument(_) => INVALID_PARAMS,
                _ => OPERATION_FAILED,
            };
            (
                code,
                Some(json!({ "kind": agent_err.kind(), "agent_id": agent_err.agent_id() })),
            )
        }
        _ => (INTERNAL_ERROR, None),
    };

    JsonRpcResponse::failure(
        id,
        JsonRpcError {
            code,
            message: err.to_string(),
            data,
        },
    )
}
