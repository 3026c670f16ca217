//! Stdio tool server
//!
//! Exposes the lifecycle operations as tools over line-delimited JSON-RPC 2.0:
//! `initialize`, `tools/list`, `tools/call` and `ping`. Requests are handled
//! concurrently; responses are written by a single writer task.

mod dispatcher;
mod server;
pub mod tools;

pub use dispatcher::{error_response, ToolDispatcher, PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION};
pub use server::RpcServer;
pub use tools::tool_descriptors;
