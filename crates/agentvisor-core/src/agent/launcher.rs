//! Agent process launcher

use crate::error::AgentError;
use crate::types::SupervisorSettings;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

/// A freshly spawned agent process with its output streams split off
pub struct LaunchedProcess {
    pub pid: u32,
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Builds and spawns agent processes from the supervisor settings
#[derive(Clone)]
pub struct ProcessLauncher {
    settings: Arc<SupervisorSettings>,
}

impl ProcessLauncher {
    pub fn new(settings: Arc<SupervisorSettings>) -> Self {
        Self { settings }
    }

    /// Command line for one agent: `<executable> <args..> <flag> <config_path>`
    pub fn command(&self, config_path: &Path) -> Command {
        let settings = &self.settings;

        let mut cmd = Command::new(&settings.executable);
        cmd.args(&settings.args)
            .arg(&settings.config_flag)
            .arg(config_path)
            .envs(&settings.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Runtime teardown must not leave orphans behind.
            .kill_on_drop(true);

        if let Some(dir) = &settings.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }

    /// Spawn exactly one process for `agent_id`.
    ///
    /// On error no process is left running: a child that spawned but could
    /// not be wired up is dropped, which kills it, and tokio reaps it.
    pub fn launch(
        &self,
        agent_id: &str,
        config_path: &Path,
    ) -> Result<LaunchedProcess, AgentError> {
        let settings = &self.settings;
        debug!(
            "Spawning agent {}: {} {:?} {} {:?}",
            agent_id, settings.executable, settings.args, settings.config_flag, config_path
        );

        let launch_failed = |reason: String| AgentError::LaunchFailed {
            id: agent_id.to_string(),
            reason,
        };

        let mut child = self.command(config_path).spawn().map_err(|e| {
            launch_failed(format!("failed to spawn '{}': {}", settings.executable, e))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| launch_failed("process exited before its PID was read".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_failed("failed to capture stdout".to_string()))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| launch_failed("failed to capture stderr".to_string()))?;

        Ok(LaunchedProcess {
            pid,
            child,
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(executable: &str, args: &[&str]) -> Arc<SupervisorSettings> {
        Arc::new(SupervisorSettings {
            executable: executable.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..SupervisorSettings::default()
        })
    }

    #[test]
    fn test_command_line_layout() {
        let launcher = ProcessLauncher::new(settings("python", &["agents/simple_agent.py"]));
        let cmd = launcher.command(&PathBuf::from("configs/agents/a.json"));
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "python");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["agents/simple_agent.py", "--config", "configs/agents/a.json"]);
    }

    #[tokio::test]
    async fn test_launch_missing_executable() {
        let launcher = ProcessLauncher::new(settings("nonexistent_agent_binary_12345", &[]));
        let result = launcher.launch("ghost", &PathBuf::from("ghost.json"));

        match result {
            Err(AgentError::LaunchFailed { id, reason }) => {
                assert_eq!(id, "ghost");
                assert!(reason.contains("failed to spawn"));
            }
            Err(other) => panic!("Expected LaunchFailed, got {other}"),
            Ok(_) => panic!("Expected LaunchFailed, got a process"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_passes_config_path() {
        use tokio::io::AsyncReadExt;

        // `sh -c script --config <path>` binds $0 to the flag and $1 to the path.
        let launcher = ProcessLauncher::new(settings("/bin/sh", &["-c", "printf '%s' \"$1\""]));
        let mut launched = launcher
            .launch("echo", &PathBuf::from("/tmp/echo.json"))
            .unwrap();
        assert!(launched.pid > 0);

        let mut out = String::new();
        launched.stdout.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "/tmp/echo.json");

        let status = launched.child.wait().await.unwrap();
        assert!(status.success());
    }
}
