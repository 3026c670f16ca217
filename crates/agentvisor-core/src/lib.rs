//! Agentvisor Core Library
//!
//! This crate provides the core functionality for Agentvisor, a supervisor
//! for independently running agent processes:
//! - Agent registry and process lifecycle (start/stop/status/list)
//! - Output draining and exit reconciliation
//! - Per-agent configuration storage
//! - A line-delimited JSON-RPC tool server
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     agentvisor-core                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  agent/        - Registry, launcher, drainers, watcher      │
//! │  rpc/          - JSON-RPC dispatch and stdio serving        │
//! │  types/        - Shared type definitions                    │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod error;
pub mod rpc;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;

// Re-export agent components
pub use agent::{
    AgentManager, AgentRegistry, ConfigStore, ExitOutcome, OutputSink, ProcessLauncher,
    StreamKind, StreamLabel, TracingSink,
};

// Re-export RPC server
pub use rpc::{RpcServer, ToolDispatcher};
