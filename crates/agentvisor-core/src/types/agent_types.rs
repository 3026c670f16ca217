//! Agent state and snapshot types

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Lifecycle state of a launched agent process.
///
/// An ID that was never started has no record at all; `Stopped` and
/// `Failed` are terminal for one launch, after which the ID may be
/// started again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Process is alive
    Running,
    /// Process exited cleanly or was stopped on request
    Stopped,
    /// Process crashed, exited non-zero, or could not be signalled
    #[serde(rename = "error")]
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "error",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of one registry record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub launch_id: uuid::Uuid,
    pub pid: u32,
    pub status: AgentState,
    pub config_path: String,
    #[serde(rename = "start_time", serialize_with = "serialize_rfc3339")]
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_rfc3339_opt")]
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// Last failure text; `null` unless the status is `error`
    pub error: Option<String>,
}

impl AgentSnapshot {
    pub fn is_running(&self) -> bool {
        self.status == AgentState::Running
    }
}

/// Result of a start or stop request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentActionResult {
    pub agent_id: String,
    pub pid: u32,
    pub status: AgentState,
    pub message: String,
}

/// Result of a configuration update
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigUpdateResult {
    pub agent_id: String,
    pub config_path: String,
    pub message: String,
}

/// Snapshot of every known agent
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AgentList {
    pub agents: Vec<AgentSnapshot>,
}

/// RFC 3339 with whole seconds, e.g. `2024-05-01T12:00:00Z`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn serialize_rfc3339<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(ts))
}

fn serialize_rfc3339_opt<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match ts {
        Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
        None => serializer.serialize_none(),
    }
}
