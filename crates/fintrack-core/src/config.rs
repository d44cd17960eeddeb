//! Application configuration management.
//!
//! Configuration is stored at `~/.config/fintrack/config.json`. Environment
//! variables override the file, so a `.env` next to the binary is enough to
//! point it at a Firebase project.
//!
//! Without a `firebase` section the tracker runs in local-only mode.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/data directory paths
const APP_NAME: &str = "fintrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_KEY: &str = "FINTRACK_FIREBASE_API_KEY";
pub const ENV_PROJECT_ID: &str = "FINTRACK_FIREBASE_PROJECT_ID";
pub const ENV_DATA_DIR: &str = "FINTRACK_DATA_DIR";
pub const ENV_OFFLINE: &str = "FINTRACK_OFFLINE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub firebase: Option<FirebaseConfig>,
    /// Start with connectivity off; nothing is sent to the remote store.
    pub offline_mode: bool,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the local cache, session and logs.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn is_local_only(&self) -> bool {
        self.firebase.is_none()
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let api_key = lookup(ENV_API_KEY).filter(|v| !v.is_empty());
        let project_id = lookup(ENV_PROJECT_ID).filter(|v| !v.is_empty());
        match (api_key, project_id) {
            (Some(api_key), Some(project_id)) => {
                self.firebase = Some(FirebaseConfig {
                    api_key,
                    project_id,
                });
            }
            (None, None) => {}
            _ => warn!(
                "Both {} and {} must be set to override the Firebase config",
                ENV_API_KEY, ENV_PROJECT_ID
            ),
        }

        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(ENV_OFFLINE) {
            self.offline_mode = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}
