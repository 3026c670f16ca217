//! Core type definitions for Agentvisor
//!
//! This module contains the shared types used across the supervisor:
//! agent state and snapshots, supervisor settings, and the JSON-RPC
//! wire types spoken by the stdio server.

mod agent_types;
mod rpc_types;
mod settings_types;

pub use agent_types::*;
pub use rpc_types::*;
pub use settings_types::*;
