//! User configuration for sow.
//!
//! Layered file → environment → CLI:
//! - `<config dir>/sow/config.toml` (user level), overridden by
//!   `<project dir>/.sow/config.toml` when present
//! - `SOW_AGENTS_<ROLE>` overrides the executor binding for one role
//! - `SOW_CLAUDE_CMD` overrides the Claude CLI command
//! - `SOW_REGISTRY_TOKEN` authenticates against the artifact store
//!
//! # Configuration File Format
//!
//! ```toml
//! [agents]
//! implementer = "claude"
//! reviewer = "claude"
//!
//! [executors.claude]
//! command = "claude"
//!
//! [tracker]
//! provider = "github"
//! repo = "acme/widgets"
//! token_env = "GITHUB_TOKEN"
//!
//! [store]
//! root = "/var/lib/sow/store"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXECUTOR: &str = "claude";

/// Environment variable prefix for per-role executor overrides.
pub const AGENT_ENV_PREFIX: &str = "SOW_AGENTS_";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ExecutorSettings {
    /// Command to invoke; defaults to the executor's name.
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerSettings {
    /// Tracker provider; only "github" is built in.
    pub provider: String,
    /// Repository slug, e.g. `acme/widgets`.
    pub repo: String,
    /// Environment variable holding the API token (default `GITHUB_TOKEN`).
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StoreSettings {
    /// Root directory of the artifact store.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// The deserialized configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SowConfig {
    /// Agent role → executor name bindings.
    #[serde(default)]
    pub agents: BTreeMap<String, String>,
    #[serde(default)]
    pub executors: BTreeMap<String, ExecutorSettings>,
    #[serde(default)]
    pub tracker: Option<TrackerSettings>,
    #[serde(default)]
    pub store: Option<StoreSettings>,
}

impl SowConfig {
    /// Load the layered configuration for a project directory.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut config = match user_config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };

        let project_config = project_dir.join(".sow").join("config.toml");
        if project_config.exists() {
            config.merge(Self::load_from(&project_config)?);
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Project-level values win over user-level ones.
    fn merge(&mut self, other: SowConfig) {
        self.agents.extend(other.agents);
        self.executors.extend(other.executors);
        if other.tracker.is_some() {
            self.tracker = other.tracker;
        }
        if other.store.is_some() {
            self.store = other.store;
        }
    }

    /// Executor name bound to an agent role. `SOW_AGENTS_<ROLE>` wins over
    /// the config file; the default binding is the Claude executor.
    pub fn executor_for_role(&self, role: &str) -> String {
        let env_key = format!("{}{}", AGENT_ENV_PREFIX, role.to_uppercase().replace('-', "_"));
        if let Ok(value) = std::env::var(&env_key)
            && !value.is_empty()
        {
            return value;
        }
        self.agents
            .get(role)
            .cloned()
            .unwrap_or_else(|| DEFAULT_EXECUTOR.to_string())
    }

    /// Command an executor should invoke. `SOW_CLAUDE_CMD` overrides the
    /// Claude executor specifically.
    pub fn executor_command(&self, executor: &str) -> String {
        if executor == DEFAULT_EXECUTOR
            && let Ok(value) = std::env::var("SOW_CLAUDE_CMD")
            && !value.is_empty()
        {
            return value;
        }
        self.executors
            .get(executor)
            .and_then(|e| e.command.clone())
            .unwrap_or_else(|| executor.to_string())
    }

    /// Token for the artifact store registry, if configured.
    pub fn registry_token(&self) -> Option<String> {
        std::env::var("SOW_REGISTRY_TOKEN").ok().filter(|t| !t.is_empty())
    }

    /// Token for the work tracker, if configured.
    pub fn tracker_token(&self) -> Option<String> {
        let env = self
            .tracker
            .as_ref()
            .and_then(|t| t.token_env.clone())
            .unwrap_or_else(|| "GITHUB_TOKEN".to_string());
        std::env::var(env).ok().filter(|t| !t.is_empty())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sow").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn default_binding_is_claude() {
        let config = SowConfig::default();
        assert_eq!(config.executor_for_role("implementer"), "claude");
        assert_eq!(config.executor_command("claude"), "claude");
    }

    #[test]
    fn file_binding_overrides_default() {
        let dir = tempdir().unwrap();
        let sow_dir = dir.path().join(".sow");
        fs::create_dir_all(&sow_dir).unwrap();
        fs::write(
            sow_dir.join("config.toml"),
            r#"
[agents]
reviewer = "codex"

[executors.codex]
command = "/usr/local/bin/codex"
"#,
        )
        .unwrap();

        let config = SowConfig::load(dir.path()).unwrap();
        assert_eq!(config.executor_for_role("reviewer"), "codex");
        assert_eq!(config.executor_command("codex"), "/usr/local/bin/codex");
        // Unbound roles still default.
        assert_eq!(config.executor_for_role("implementer"), "claude");
    }

    #[test]
    fn env_binding_wins_over_file() {
        let dir = tempdir().unwrap();
        let sow_dir = dir.path().join(".sow");
        fs::create_dir_all(&sow_dir).unwrap();
        fs::write(sow_dir.join("config.toml"), "[agents]\nplanner = \"codex\"\n").unwrap();

        // Serialized env access; the var is cleared before the assert below.
        unsafe {
            std::env::set_var("SOW_AGENTS_PLANNER", "claude");
        }
        let config = SowConfig::load(dir.path()).unwrap();
        let bound = config.executor_for_role("planner");
        unsafe {
            std::env::remove_var("SOW_AGENTS_PLANNER");
        }
        assert_eq!(bound, "claude");
    }

    #[test]
    fn tracker_settings_parse() {
        let dir = tempdir().unwrap();
        let sow_dir = dir.path().join(".sow");
        fs::create_dir_all(&sow_dir).unwrap();
        fs::write(
            sow_dir.join("config.toml"),
            "[tracker]\nprovider = \"github\"\nrepo = \"acme/widgets\"\n",
        )
        .unwrap();

        let config = SowConfig::load(dir.path()).unwrap();
        let tracker = config.tracker.unwrap();
        assert_eq!(tracker.provider, "github");
        assert_eq!(tracker.repo, "acme/widgets");
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "agents = not-a-table").unwrap();
        let result = SowConfig::load_from(&path);
        assert!(result.is_err());
    }
}
