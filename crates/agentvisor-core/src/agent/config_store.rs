//! Per-agent configuration files

use crate::error::AgentError;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// Stores one opaque `<agent_id>.json` blob per agent in a directory
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the configuration for `agent_id` lives
    pub fn path_for(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", agent_id))
    }

    /// Whether a configuration file exists for `agent_id`
    pub async fn exists(&self, agent_id: &str) -> bool {
        let path = self.path_for(agent_id);
        match fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Cannot stat config {:?}: {}", path, e);
                false
            }
        }
    }

    pub async fn read(&self, agent_id: &str) -> std::io::Result<Vec<u8>> {
        fs::read(self.path_for(agent_id)).await
    }

    /// Replace the configuration for `agent_id` with `data`.
    ///
    /// Creates the directory when missing. The blob is written to a sibling
    /// temp file first and renamed over the target, so readers never see a
    /// half-written file.
    pub async fn write(&self, agent_id: &str, data: &[u8]) -> Result<PathBuf, AgentError> {
        let path = self.path_for(agent_id);
        let write_failed = |reason: String| AgentError::WriteFailed {
            id: agent_id.to_string(),
            path: path.to_string_lossy().to_string(),
            reason,
        };

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            write_failed(format!("failed to create directory {:?}: {}", self.dir, e))
        })?;

        // Temp name length must not depend on the ID, or long IDs overflow NAME_MAX
        let tmp_path = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        if let Err(e) = fs::write(&tmp_path, data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(write_failed(e.to_string()));
        }

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(write_failed(e.to_string()));
        }

        info!(
            "Wrote {} bytes of configuration for agent '{}' to {:?}",
            data.len(),
            agent_id,
            path
        );
        Ok(path)
    }
}
