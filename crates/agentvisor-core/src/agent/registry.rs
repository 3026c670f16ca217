//! Agent registry
//!
//! The registry is the only shared mutable state in the supervisor. Every
//! mutation happens under its write lock: lifecycle operations take it
//! synchronously, exit watchers take it when their process ends. Read-only
//! lookups share the read lock.

use super::watcher::ExitOutcome;
use crate::types::{AgentSnapshot, AgentState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use tokio::sync::{oneshot, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reply channel for a termination request
pub type KillReply = oneshot::Sender<io::Result<()>>;

/// Handle used to ask the exit watcher owning a process to kill it
#[derive(Debug)]
pub struct ProcessControl {
    kill_tx: oneshot::Sender<KillReply>,
}

impl ProcessControl {
    pub fn new(kill_tx: oneshot::Sender<KillReply>) -> Self {
        Self { kill_tx }
    }

    /// Deliver a termination request and report whether the signal went out.
    ///
    /// A watcher that no longer listens has already seen the process exit,
    /// which counts as success.
    pub async fn terminate(self) -> io::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.kill_tx.send(reply_tx).is_err() {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }
}

/// Live state for one agent ID
#[derive(Debug)]
pub struct AgentRecord {
    id: String,
    launch_id: Uuid,
    pid: u32,
    state: AgentState,
    config_path: PathBuf,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    last_error: Option<String>,
    control: Option<ProcessControl>,
}

impl AgentRecord {
    /// Record for a process that was just launched
    pub fn running(
        id: impl Into<String>,
        launch_id: Uuid,
        pid: u32,
        config_path: PathBuf,
        control: ProcessControl,
    ) -> Self {
        Self {
            id: id.into(),
            launch_id,
            pid,
            state: AgentState::Running,
            config_path,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            last_error: None,
            control: Some(control),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn launch_id(&self) -> Uuid {
        self.launch_id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == AgentState::Running
    }

    /// Hand out the process control handle; it can be taken once
    pub fn take_control(&mut self) -> Option<ProcessControl> {
        self.control.take()
    }

    pub fn mark_stopped(&mut self) {
        self.state = AgentState::Stopped;
        self.last_error = None;
        self.finished_at.get_or_insert_with(Utc::now);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = AgentState::Failed;
        self.last_error = Some(error.into());
        self.finished_at.get_or_insert_with(Utc::now);
    }

    /// Apply what the exit watcher observed. The observation is final.
    pub fn apply_exit(&mut self, outcome: &ExitOutcome) {
        self.control = None;
        self.exit_code = outcome.exit_code();

        match outcome.failure() {
            None => self.mark_stopped(),
            Some(error) => self.mark_failed(error),
        }
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.id.clone(),
            launch_id: self.launch_id,
            pid: self.pid,
            status: self.state,
            config_path: self.config_path.to_string_lossy().to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            exit_code: self.exit_code,
            error: self.last_error.clone(),
        }
    }
}

/// Map from agent ID to its current record
pub type RecordMap = HashMap<String, AgentRecord>;

/// Concurrent agent registry
#[derive(Debug, Default)]
pub struct AgentRegistry {
    records: RwLock<RecordMap>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access for lookups and enumeration
    pub async fn read(&self) -> RwLockReadGuard<'_, RecordMap> {
        self.records.read().await
    }

    /// Exclusive access for mutations and consistent multi-step sequences
    pub async fn write(&self) -> RwLockWriteGuard<'_, RecordMap> {
        self.records.write().await
    }

    pub async fn snapshot(&self, id: &str) -> Option<AgentSnapshot> {
        self.read().await.get(id).map(AgentRecord::snapshot)
    }

    /// Snapshot of every record, ordered by agent ID
    pub async fn snapshots(&self) -> Vec<AgentSnapshot> {
        let mut agents: Vec<_> = self.read().await.values().map(AgentRecord::snapshot).collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }

    /// IDs whose record is currently running
    pub async fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .read()
            .await
            .values()
            .filter(|r| r.is_running())
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Record the end of launch `launch_id` of `id`.
    ///
    /// Returns `false` and leaves the map untouched when the record is gone
    /// or belongs to a later launch.
    pub async fn finalize(&self, id: &str, launch_id: Uuid, outcome: &ExitOutcome) -> bool {
        let mut records = self.write().await;

        let Some(record) = records.get_mut(id) else {
            debug!("No record for agent '{}' on exit, skipping", id);
            return false;
        };

        if record.launch_id != launch_id {
            debug!(
                "Agent '{}' was relaunched since launch {}, skipping exit update",
                id, launch_id
            );
            return false;
        }

        record.apply_exit(outcome);
        match &record.last_error {
            Some(error) => warn!(
                "Agent '{}' (PID {}) exited with error: {}",
                id, record.pid, error
            ),
            None => info!("Agent '{}' (PID {}) exited cleanly", id, record.pid),
        }
        true
    }
}
