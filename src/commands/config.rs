use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ForgeError, Result};
use crate::session::SessionSettings;
use crate::util::expand_tilde;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787/api/chat";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub id: String,
    pub name: String,
    pub updated_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForgeConfig {
    pub version: u32,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub pacing_ms: u64,
    pub done_linger_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    pub projects: Vec<ProjectEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_project: Option<String>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            pacing_ms: 350,
            done_linger_ms: 1500,
            data_dir: None,
            projects: vec![],
            last_active_project: None,
        }
    }
}

impl ForgeConfig {
    /// Root for projects, logs and previews.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => expand_tilde(dir),
            None => default_data_dir(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            pacing: Duration::from_millis(self.pacing_ms),
            done_linger: Duration::from_millis(self.done_linger_ms),
        }
    }

    /// `CODEFORGE_ENDPOINT` / `CODEFORGE_API_KEY` win over the file.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = var("CODEFORGE_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint;
        }
        if let Some(key) = var("CODEFORGE_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key);
        }
    }

    /// Upsert by id and mark the project as last active.
    pub fn record_project(&mut self, entry: ProjectEntry) {
        let id = entry.id.clone();
        if let Some(existing) = self.projects.iter_mut().find(|p| p.id == id) {
            *existing = entry;
        } else {
            self.projects.push(entry);
        }
        self.last_active_project = Some(id);
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".codeforge"))
        .unwrap_or_else(|| PathBuf::from(".codeforge"))
}

pub fn config_path() -> PathBuf {
    default_data_dir().join("config.json")
}

/// Load the config file, falling back to defaults when it is missing or
/// unreadable, then apply environment overrides.
pub fn load_config() -> ForgeConfig {
    let mut config = load_config_from(&config_path());
    config.apply_env(|name| std::env::var(name).ok());
    config
}

pub fn load_config_from(path: &Path) -> ForgeConfig {
    let Ok(content) = std::fs::read_to_string(path) else {
        return ForgeConfig::default();
    };
    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "ignoring unreadable config");
            ForgeConfig::default()
        }
    }
}

pub fn save_config_to(path: &Path, config: &ForgeConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Record a project in the on-disk config and persist it.
pub fn save_project_entry(path: &Path, entry: ProjectEntry) -> Result<ForgeConfig> {
    if entry.id.trim().is_empty() {
        return Err(ForgeError::Custom("Project id cannot be empty".into()));
    }
    let mut config = load_config_from(path);
    config.record_project(entry);
    save_config_to(path, &config)?;
    Ok(config)
}
