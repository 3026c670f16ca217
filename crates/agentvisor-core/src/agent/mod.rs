//! Agent lifecycle management
//!
//! This module handles:
//! - Process launching with piped output
//! - Output draining to a pluggable sink
//! - Exit watching and state reconciliation
//! - The concurrent agent registry
//! - Lifecycle operations (start/stop/status/list/update_config)

mod config_store;
mod drainer;
mod launcher;
mod manager;
mod registry;
mod watcher;

pub use config_store::ConfigStore;
pub use drainer::{drain, spawn_drainer, OutputSink, StreamKind, StreamLabel, TracingSink};
pub use launcher::{LaunchedProcess, ProcessLauncher};
pub use manager::{validate_agent_id, AgentManager};
pub use registry::{AgentRecord, AgentRegistry, KillReply, ProcessControl, RecordMap};
pub use watcher::{ExitOutcome, ExitWatcher};
