//! Tool table advertised over `tools/list`

use crate::types::ToolDescriptor;
use serde_json::json;

pub const RUN_AGENT: &str = "run_agent";
pub const STOP_AGENT: &str = "stop_agent";
pub const GET_AGENT_STATUS: &str = "get_agent_status";
pub const UPDATE_AGENT_CONFIG: &str = "update_agent_config";
pub const LIST_AGENTS: &str = "list_agents";

fn agent_id_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Unique identifier of the agent."
    })
}

fn tool(name: &str, description: &str, input_schema: serde_json::Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Descriptors for every lifecycle tool
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        tool(
            RUN_AGENT,
            "Starts the agent with the given ID using its stored configuration.",
            json!({
                "type": "object",
                "properties": { "agent_id": agent_id_property() },
                "required": ["agent_id"]
            }),
        ),
        tool(
            STOP_AGENT,
            "Stops a running agent by its ID.",
            json!({
                "type": "object",
                "properties": { "agent_id": agent_id_property() },
                "required": ["agent_id"]
            }),
        ),
        tool(
            GET_AGENT_STATUS,
            "Returns the current status of an agent by its ID. The `error` field is null \
             unless the status is `error`.",
            json!({
                "type": "object",
                "properties": { "agent_id": agent_id_property() },
                "required": ["agent_id"]
            }),
        ),
        tool(
            UPDATE_AGENT_CONFIG,
            "Writes the configuration file used by the next start of an agent.",
            json!({
                "type": "object",
                "properties": {
                    "agent_id": agent_id_property(),
                    "config_data": {
                        "type": "string",
                        "description": "Configuration data (JSON as a string)."
                    }
                },
                "required": ["agent_id", "config_data"]
            }),
        ),
        tool(
            LIST_AGENTS,
            "Lists every registered agent and its status.",
            json!({ "type": "object", "properties": {} }),
        ),
    ]
}
