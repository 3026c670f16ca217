//! Exit watcher
//!
//! One watcher task per launched process. The watcher owns the `Child`: it
//! is the only place that waits on it (so the process is always reaped) and
//! the only place that kills it, on request from `stop` over a one-shot
//! channel.

use super::registry::{AgentRegistry, KillReply};
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process ended on its own
    Exited {
        code: Option<i32>,
        description: String,
        success: bool,
    },
    /// The process ended after a termination request
    Terminated { code: Option<i32> },
    /// Waiting on the process failed
    WaitFailed(String),
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus, requested: bool) -> Self {
        if requested {
            Self::Terminated {
                code: status.code(),
            }
        } else {
            Self::Exited {
                code: status.code(),
                description: status.to_string(),
                success: status.success(),
            }
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { code, .. } | Self::Terminated { code } => *code,
            Self::WaitFailed(_) => None,
        }
    }

    /// Error text when the outcome counts as a failure
    pub fn failure(&self) -> Option<String> {
        match self {
            Self::Exited {
                success: false,
                description,
                ..
            } => Some(description.clone()),
            Self::Exited { .. } | Self::Terminated { .. } => None,
            Self::WaitFailed(e) => Some(e.clone()),
        }
    }
}

/// Waits for one agent process and reconciles its registry record
pub struct ExitWatcher {
    agent_id: String,
    launch_id: Uuid,
    pid: u32,
    child: Child,
    kill_rx: oneshot::Receiver<KillReply>,
    registry: Arc<AgentRegistry>,
}

impl ExitWatcher {
    pub fn new(
        agent_id: impl Into<String>,
        launch_id: Uuid,
        pid: u32,
        child: Child,
        kill_rx: oneshot::Receiver<KillReply>,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            launch_id,
            pid,
            child,
            kill_rx,
            registry,
        }
    }

    pub fn spawn(self) -> JoinHandle<ExitOutcome> {
        tokio::spawn(self.run())
    }

    async fn run(self) -> ExitOutcome {
        let Self {
            agent_id,
            launch_id,
            pid,
            mut child,
            kill_rx,
            registry,
        } = self;

        // kill_rx is consumed here, so a stop racing with the exit gets its
        // answer before we queue for the write lock it may be holding.
        let outcome = wait_for_exit(&mut child, kill_rx, &agent_id, pid).await;
        debug!("Agent '{}' (PID {}) ended: {:?}", agent_id, pid, outcome);

        registry.finalize(&agent_id, launch_id, &outcome).await;
        outcome
    }
}

async fn wait_for_exit(
    child: &mut Child,
    mut kill_rx: oneshot::Receiver<KillReply>,
    agent_id: &str,
    pid: u32,
) -> ExitOutcome {
    let request = tokio::select! {
        status = child.wait() => return classify(status, false),
        request = &mut kill_rx => request.ok(),
    };

    let requested = match request {
        Some(reply) => {
            let result = child.start_kill();
            let delivered = result.is_ok();
            if let Err(e) = &result {
                warn!("Failed to kill agent '{}' (PID {}): {}", agent_id, pid, e);
            }
            let _ = reply.send(result);
            delivered
        }
        // Control handle dropped without a request.
        None => false,
    };

    classify(child.wait().await, requested)
}

fn classify(status: std::io::Result<ExitStatus>, requested: bool) -> ExitOutcome {
    match status {
        Ok(status) => ExitOutcome::from_status(status, requested),
        Err(e) => ExitOutcome::WaitFailed(format!("failed to wait for process: {}", e)),
    }
}
