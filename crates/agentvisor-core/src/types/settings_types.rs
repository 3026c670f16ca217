//! Supervisor settings

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit settings file
pub const SETTINGS_PATH_ENV: &str = "AGENTVISOR_SETTINGS";
/// Environment override for [`SupervisorSettings::configs_dir`]
pub const CONFIGS_DIR_ENV: &str = "AGENTVISOR_CONFIGS_DIR";
/// Environment override for [`SupervisorSettings::executable`]
pub const EXECUTABLE_ENV: &str = "AGENTVISOR_EXECUTABLE";

/// How agents are launched and where their configuration lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorSettings {
    /// Directory holding one `<agent_id>.json` per agent
    pub configs_dir: PathBuf,
    /// Program started for every agent
    pub executable: String,
    /// Arguments placed before the config flag
    pub args: Vec<String>,
    /// Flag preceding the configuration path
    pub config_flag: String,
    /// Extra environment for agent processes
    pub env: HashMap<String, String>,
    /// Working directory for agent processes; inherits ours when unset
    pub working_dir: Option<PathBuf>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            configs_dir: PathBuf::from("configs").join("agents"),
            executable: "python".to_string(),
            args: vec![Path::new("agents")
                .join("simple_agent.py")
                .to_string_lossy()
                .to_string()],
            config_flag: "--config".to_string(),
            env: HashMap::new(),
            working_dir: None,
        }
    }
}

impl SupervisorSettings {
    /// Load settings: defaults, then a settings file, then environment overrides.
    ///
    /// The file is `explicit` when given, else `$AGENTVISOR_SETTINGS`, else
    /// `agentvisor/settings.json` under the user config directory if present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(SETTINGS_PATH_ENV).map(PathBuf::from));

        let mut settings = match path {
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_settings_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No settings file found, using defaults");
                    Self::default()
                }
            },
        };

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Read settings from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Settings(format!("Failed to read settings file {:?}: {}", path, e))
        })?;
        let settings: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::Settings(format!("Invalid settings file {:?}: {}", path, e))
        })?;

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Apply overrides using `lookup` to resolve environment variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(CONFIGS_DIR_ENV).filter(|v| !v.is_empty()) {
            self.configs_dir = PathBuf::from(dir);
        }
        if let Some(exe) = lookup(EXECUTABLE_ENV).filter(|v| !v.is_empty()) {
            self.executable = exe;
        }
    }

    /// `<config dir>/agentvisor/settings.json`
    pub fn default_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("agentvisor").join("settings.json"))
    }
}
