//! Agent lifecycle manager

use super::config_store::ConfigStore;
use super::drainer::{spawn_drainer, OutputSink, StreamKind, StreamLabel, TracingSink};
use super::launcher::ProcessLauncher;
use super::registry::{AgentRecord, AgentRegistry, ProcessControl};
use super::watcher::ExitWatcher;
use crate::error::{AgentError, Result};
use crate::types::*;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use uuid::Uuid;

/// Starts, stops and reports on agent processes
pub struct AgentManager {
    registry: Arc<AgentRegistry>,
    launcher: ProcessLauncher,
    configs: ConfigStore,
    sink: Arc<dyn OutputSink>,
}

impl AgentManager {
    /// Manager that logs agent output through tracing
    pub fn new(settings: SupervisorSettings) -> Self {
        Self::with_sink(settings, Arc::new(TracingSink))
    }

    /// Manager that forwards agent output to `sink`
    pub fn with_sink(settings: SupervisorSettings, sink: Arc<dyn OutputSink>) -> Self {
        let settings = Arc::new(settings);
        Self {
            registry: Arc::new(AgentRegistry::new()),
            launcher: ProcessLauncher::new(Arc::clone(&settings)),
            configs: ConfigStore::new(settings.configs_dir.clone()),
            sink,
        }
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.configs
    }

    /// Launch the agent with its stored configuration.
    ///
    /// The registry write lock is held across the config check, the spawn
    /// and the insert, so concurrent starts for one ID are fully serialized
    /// and nobody can observe a half-built record.
    pub async fn start(&self, agent_id: &str) -> Result<AgentActionResult> {
        validate_agent_id(agent_id)?;

        let mut records = self.registry.write().await;

        if records.get(agent_id).is_some_and(AgentRecord::is_running) {
            return Err(AgentError::AlreadyRunning(agent_id.to_string()).into());
        }

        let config_path = self.configs.path_for(agent_id);
        if !self.configs.exists(agent_id).await {
            return Err(AgentError::ConfigNotFound {
                id: agent_id.to_string(),
                path: config_path.to_string_lossy().to_string(),
            }
            .into());
        }

        let launched = self.launcher.launch(agent_id, &config_path)?;
        let pid = launched.pid;
        let launch_id = Uuid::new_v4();
        let (kill_tx, kill_rx) = oneshot::channel();

        records.insert(
            agent_id.to_string(),
            AgentRecord::running(
                agent_id,
                launch_id,
                pid,
                config_path.clone(),
                ProcessControl::new(kill_tx),
            ),
        );

        spawn_drainer(
            launched.stdout,
            StreamLabel::new(agent_id, StreamKind::Stdout),
            Arc::clone(&self.sink),
        );
        spawn_drainer(
            launched.stderr,
            StreamLabel::new(agent_id, StreamKind::Stderr),
            Arc::clone(&self.sink),
        );
        ExitWatcher::new(
            agent_id,
            launch_id,
            pid,
            launched.child,
            kill_rx,
            Arc::clone(&self.registry),
        )
        .spawn();

        info!(
            "Agent '{}' started with PID {}. Configuration: {:?}",
            agent_id, pid, config_path
        );

        Ok(AgentActionResult {
            agent_id: agent_id.to_string(),
            pid,
            status: AgentState::Running,
            message: format!("Agent '{}' started with PID {}.", agent_id, pid),
        })
    }

    /// Request termination of a running agent.
    ///
    /// Does not wait for the process to be reaped; the exit watcher records
    /// the final outcome.
    pub async fn stop(&self, agent_id: &str) -> Result<AgentActionResult> {
        validate_agent_id(agent_id)?;

        let mut records = self.registry.write().await;

        let record = records
            .get_mut(agent_id)
            .filter(|r| r.is_running())
            .ok_or_else(|| AgentError::NotRunning(agent_id.to_string()))?;
        let pid = record.pid();

        let delivered = match record.take_control() {
            Some(control) => control.terminate().await.map_err(|e| e.to_string()),
            None => Err("process handle is unavailable".to_string()),
        };

        if let Err(reason) = delivered {
            error!("Failed to stop agent '{}' (PID {}): {}", agent_id, pid, reason);
            record.mark_failed(reason.clone());
            return Err(AgentError::StopFailed {
                id: agent_id.to_string(),
                pid,
                reason,
            }
            .into());
        }

        record.mark_stopped();
        info!("Agent '{}' (PID {}) stopped", agent_id, pid);

        Ok(AgentActionResult {
            agent_id: agent_id.to_string(),
            pid,
            status: record.state(),
            message: format!("Agent '{}' (PID {}) stopped.", agent_id, pid),
        })
    }

    /// Current record for one agent
    pub async fn status(&self, agent_id: &str) -> Result<AgentSnapshot> {
        validate_agent_id(agent_id)?;

        self.registry
            .snapshot(agent_id)
            .await
            .ok_or_else(|| AgentError::NotFound(agent_id.to_string()).into())
    }

    /// Every known agent, ordered by ID
    pub async fn list(&self) -> AgentList {
        AgentList {
            agents: self.registry.snapshots().await,
        }
    }

    /// Persist the configuration used by the next start of `agent_id`.
    ///
    /// A running instance keeps the configuration it was launched with.
    pub async fn update_config(
        &self,
        agent_id: &str,
        config_data: &str,
    ) -> Result<ConfigUpdateResult> {
        validate_agent_id(agent_id)?;

        let path = self.configs.write(agent_id, config_data.as_bytes()).await?;

        Ok(ConfigUpdateResult {
            agent_id: agent_id.to_string(),
            config_path: path.to_string_lossy().to_string(),
            message: format!("Configuration for agent '{}' updated.", agent_id),
        })
    }

    /// IDs of all running agents
    pub async fn running_agents(&self) -> Vec<String> {
        self.registry.running_ids().await
    }

    /// Stop all running agents
    pub async fn stop_all(&self) -> Result<()> {
        let running = self.running_agents().await;
        if !running.is_empty() {
            info!("Stopping {} running agent(s)", running.len());
        }

        for id in running {
            match self.stop(&id).await {
                Ok(_) => {}
                // Exited on its own in the meantime.
                Err(crate::Error::Agent(AgentError::NotRunning(_))) => {}
                Err(e) => error!("Error stopping agent {}: {}", id, e),
            }
        }

        Ok(())
    }
}

/// Reject IDs that are empty or could escape the configuration directory
pub fn validate_agent_id(agent_id: &str) -> std::result::Result<(), AgentError> {
    if agent_id.trim().is_empty() {
        return Err(AgentError::InvalidArgument(
            "agent_id must be a non-empty string".to_string(),
        ));
    }
    if agent_id == "." || agent_id == ".." || agent_id.contains(&['/', '\\', '\0'][..]) {
        return Err(AgentError::InvalidArgument(format!(
            "agent_id '{}' must not contain path separators",
            agent_id
        )));
    }
    Ok(())
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::super::drainer::test_support::CollectingSink;
    use super::*;
    use crate::Error;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const LONG_RUNNING: &str = "sleep 30";

    /// Settings that run `script` through `/bin/sh`; the config path lands in `$1`
    fn sh_settings(dir: &Path, script: &str) -> SupervisorSettings {
        SupervisorSettings {
            configs_dir: dir.join("configs").join("agents"),
            executable: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..SupervisorSettings::default()
        }
    }

    async fn manager_with(script: &str, agents: &[&str]) -> (AgentManager, TempDir) {
        let dir = tempdir().unwrap();
        let manager = AgentManager::new(sh_settings(dir.path(), script));
        for id in agents {
            manager.update_config(id, r#"{"name": "test"}"#).await.unwrap();
        }
        (manager, dir)
    }

    fn process_exists(pid: u32) -> bool {
        std::process::Command::new("/bin/sh")
            .args(["-c", &format!("kill -0 {pid}")])
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn wait_for_state(manager: &AgentManager, id: &str, state: AgentState) -> AgentSnapshot {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let snapshot = manager.status(id).await.unwrap();
            if snapshot.status == state {
                return snapshot;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "agent {id} stuck in {:?}, expected {:?}",
                snapshot.status,
                state
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_start_reports_running_with_pid() {
        let (manager, _dir) = manager_with(LONG_RUNNING, &["alpha"]).await;

        let started = manager.start("alpha").await.unwrap();
        assert_eq!(started.status, AgentState::Running);
        assert!(started.pid > 0);

        let status = manager.status("alpha").await.unwrap();
        assert_eq!(status.status, AgentState::Running);
        assert_eq!(status.pid, started.pid);
        assert!(status.config_path.ends_with("alpha.json"));
        assert_eq!(status.error, None);

        manager.stop("alpha").await.unwrap();
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let (manager, _dir) = manager_with(LONG_RUNNING, &["alpha"]).await;

        let first = manager.start("alpha").await.unwrap();
        let second = manager.start("alpha").await;
        assert!(matches!(
            second,
            Err(Error::Agent(AgentError::AlreadyRunning(ref id))) if id == "alpha"
        ));

        let agents = manager.list().await.agents;
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].pid, first.pid);
        assert!(agents[0].is_running());

        manager.stop("alpha").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_launch_once() {
        let (manager, _dir) = manager_with(LONG_RUNNING, &["alpha"]).await;
        let manager = Arc::new(manager);

        let attempts = (0..8).map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.start("alpha").await })
        });
        let results = futures::future::join_all(attempts).await;

        let mut started = 0;
        for result in results {
            match result.unwrap() {
                Ok(_) => started += 1,
                Err(Error::Agent(AgentError::AlreadyRunning(_))) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(manager.running_agents().await, vec!["alpha".to_string()]);

        manager.stop_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_then_watcher_keeps_stopped() {
        let (manager, _dir) = manager_with(LONG_RUNNING, &["alpha"]).await;
        let started = manager.start("alpha").await.unwrap();

        let stopped = manager.stop("alpha").await.unwrap();
        assert_eq!(stopped.status, AgentState::Stopped);
        assert_eq!(stopped.pid, started.pid);

        // Once the watcher has reaped the killed process, `kill -0` fails.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while process_exists(started.pid) {
            assert_eq!(manager.status("alpha").await.unwrap().status, AgentState::Stopped);
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A requested kill is not a crash.
        let snapshot = manager.status("alpha").await.unwrap();
        assert_eq!(snapshot.status, AgentState::Stopped);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let (manager, _dir) = manager_with("exit 0", &["alpha"]).await;

        assert!(matches!(
            manager.stop("alpha").await,
            Err(Error::Agent(AgentError::NotRunning(_)))
        ));

        manager.start("alpha").await.unwrap();
        let before = wait_for_state(&manager, "alpha", AgentState::Stopped).await;

        assert!(matches!(
            manager.stop("alpha").await,
            Err(Error::Agent(AgentError::NotRunning(_)))
        ));
        assert_eq!(manager.status("alpha").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_clean_exit_reports_stopped() {
        let (manager, _dir) = manager_with("exit 0", &["alpha"]).await;
        manager.start("alpha").await.unwrap();

        let snapshot = wait_for_state(&manager, "alpha", AgentState::Stopped).await;
        assert_eq!(snapshot.exit_code, Some(0));
        assert_eq!(snapshot.error, None);
        assert!(snapshot.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_failed() {
        let (manager, _dir) = manager_with("exit 3", &["alpha"]).await;
        manager.start("alpha").await.unwrap();

        let snapshot = wait_for_state(&manager, "alpha", AgentState::Failed).await;
        assert_eq!(snapshot.exit_code, Some(3));
        assert!(!snapshot.error.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_missing_config_leaves_no_record() {
        let (manager, _dir) = manager_with(LONG_RUNNING, &[]).await;

        let result = manager.start("a").await;
        assert!(matches!(
            result,
            Err(Error::Agent(AgentError::ConfigNotFound { ref id, .. })) if id == "a"
        ));
        assert!(manager.list().await.agents.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_no_record() {
        let dir = tempdir().unwrap();
        let mut settings = sh_settings(dir.path(), LONG_RUNNING);
        settings.executable = "/nonexistent/agent-binary".to_string();
        let manager = AgentManager::new(settings);
        manager.update_config("alpha", "{}").await.unwrap();

        let result = manager.start("alpha").await;
        assert!(matches!(result, Err(Error::Agent(AgentError::LaunchFailed { .. }))));
        assert!(manager.list().await.agents.is_empty());
    }

    #[tokio::test]
    async fn test_relaunch_after_exit_gets_fresh_record() {
        let (manager, _dir) = manager_with("exit 0", &["alpha"]).await;

        manager.start("alpha").await.unwrap();
        let first = wait_for_state(&manager, "alpha", AgentState::Stopped).await;

        manager.start("alpha").await.unwrap();
        let second = wait_for_state(&manager, "alpha", AgentState::Stopped).await;

        assert_ne!(first.launch_id, second.launch_id);
        assert!(second.started_at >= first.started_at);
        assert_eq!(manager.list().await.agents.len(), 1);
    }

    #[tokio::test]
    async fn test_update_config_while_running_leaves_registry() {
        let (manager, _dir) = manager_with(LONG_RUNNING, &["alpha"]).await;
        manager.start("alpha").await.unwrap();
        let before = manager.status("alpha").await.unwrap();

        let updated = manager.update_config("alpha", r#"{"name": "next"}"#).await.unwrap();
        assert!(updated.config_path.ends_with("alpha.json"));
        assert_eq!(manager.status("alpha").await.unwrap(), before);
        assert_eq!(
            manager.config_store().read("alpha").await.unwrap(),
            br#"{"name": "next"}"#.to_vec()
        );

        manager.stop("alpha").await.unwrap();
    }

    #[tokio::test]
    async fn test_output_is_forwarded_per_stream() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let manager = AgentManager::with_sink(
            sh_settings(dir.path(), "echo hello; echo oops >&2"),
            sink.clone(),
        );
        manager.update_config("alpha", "{}").await.unwrap();
        manager.start("alpha").await.unwrap();
        wait_for_state(&manager, "alpha", AgentState::Stopped).await;

        // Drainers may finish after the watcher.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while sink.output("alpha", StreamKind::Stderr).await.is_empty()
            || sink.output("alpha", StreamKind::Stdout).await.is_empty()
        {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(sink.output("alpha", StreamKind::Stdout).await, "hello\n");
        assert_eq!(sink.output("alpha", StreamKind::Stderr).await, "oops\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_list_never_sees_partial_records() {
        let (manager, _dir) = manager_with(LONG_RUNNING, &["a", "b", "c", "d"]).await;
        let manager = Arc::new(manager);

        let starter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                for id in ["a", "b", "c", "d"] {
                    manager.start(id).await.unwrap();
                }
            })
        };

        while !starter.is_finished() {
            for agent in manager.list().await.agents {
                assert!(agent.pid > 0);
                assert_eq!(agent.status, AgentState::Running);
            }
            tokio::task::yield_now().await;
        }
        starter.await.unwrap();
        assert_eq!(manager.list().await.agents.len(), 4);

        manager.stop_all().await.unwrap();
        assert!(manager.running_agents().await.is_empty());
    }
}
