//! Layered configuration for relay.
//!
//! Sources, lowest to highest precedence:
//! 1. `relay.toml` (or the file passed with `--config`)
//! 2. Environment, after `.env` has been loaded by dotenvy
//! 3. CLI flags, applied by the caller
//!
//! ```toml
//! [chat]
//! telegram_token = "123:abc"
//! chat_id = 123456
//!
//! [github]
//! token = "ghp_..."
//!
//! [server]
//! port = 3000
//!
//! [agent]
//! claude_cmd = "claude"
//! max_turns = 50
//! max_budget_usd = 5.0
//! allowed_tools = ["Read", "Edit", "Write", "Glob", "Grep", "Bash", "Task"]
//! progress_interval_secs = 20
//!
//! [projects]
//! demo = "/srv/checkouts/demo"
//! ```
//!
//! Projects can also come from `PROJECT_<NAME>=<path>` variables; the key
//! is lowercased with `_` turned into `-`, so `PROJECT_MY_APP` is `my-app`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::agent::{
    DEFAULT_ALLOWED_TOOLS, DEFAULT_MAX_BUDGET_USD, DEFAULT_MAX_TURNS, PermissionMode,
};
use crate::errors::ConfigError;
use crate::progress::PROGRESS_INTERVAL;
use crate::server::DEFAULT_PORT;
use crate::workflow::WorkflowSettings;

pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";
const PROJECT_ENV_PREFIX: &str = "PROJECT_";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub chat: ChatSection,
    pub github: GitHubSection,
    pub server: ServerSection,
    pub agent: AgentSection,
    pub projects: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub telegram_token: Option<String>,
    pub chat_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubSection {
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub claude_cmd: Option<String>,
    pub max_turns: Option<u32>,
    pub max_budget_usd: Option<f64>,
    pub allowed_tools: Option<Vec<String>>,
    pub progress_interval_secs: Option<u64>,
    pub permission_mode: Option<PermissionMode>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: Option<String>,
    pub chat_id: Option<i64>,
    pub github_token: Option<String>,
    pub port: u16,
    pub claude_cmd: String,
    pub workflow: WorkflowSettings,
    pub projects: BTreeMap<String, PathBuf>,
}

impl Config {
    /// Load from `file` (required to exist when given), else from
    /// `relay.toml` if present, then apply the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match file {
            Some(path) => Some(ConfigFile::load(path)?),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Some(ConfigFile::load(default)?)
                } else {
                    None
                }
            }
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(file.unwrap_or_default(), &env)
    }

    /// Merge a parsed config file with environment variables. Environment
    /// values win.
    pub fn from_sources(
        file: ConfigFile,
        env: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let chat_id = match var("TELEGRAM_CHAT_ID") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                key: "TELEGRAM_CHAT_ID".into(),
                value: raw.into(),
            })?),
            None => file.chat.chat_id,
        };

        let port = match var("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".into(),
                value: raw.into(),
            })?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        let mut projects = file.projects;
        for (key, value) in env {
            if let Some(name) = project_key_from_env(key)
                && !value.trim().is_empty()
            {
                projects.insert(name, PathBuf::from(value.trim()));
            }
        }

        let agent = file.agent;
        let workflow = WorkflowSettings {
            allowed_tools: agent.allowed_tools.unwrap_or_else(|| {
                DEFAULT_ALLOWED_TOOLS.iter().map(|s| s.to_string()).collect()
            }),
            permission_mode: agent.permission_mode.unwrap_or_default(),
            max_turns: agent.max_turns.unwrap_or(DEFAULT_MAX_TURNS),
            max_budget_usd: agent.max_budget_usd.unwrap_or(DEFAULT_MAX_BUDGET_USD),
            progress_interval: agent
                .progress_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(PROGRESS_INTERVAL),
        };

        Ok(Self {
            telegram_token: var("TELEGRAM_BOT_TOKEN")
                .map(str::to_string)
                .or(file.chat.telegram_token),
            chat_id,
            github_token: var("GITHUB_TOKEN").map(str::to_string).or(file.github.token),
            port,
            claude_cmd: var("CLAUDE_CMD")
                .map(str::to_string)
                .or(agent.claude_cmd)
                .unwrap_or_else(|| "claude".to_string()),
            workflow,
            projects,
        })
    }

    /// Every command needs at least one project.
    pub fn require_projects(&self) -> Result<(), ConfigError> {
        if self.projects.is_empty() {
            return Err(ConfigError::NoProjects);
        }
        Ok(())
    }

    /// The bot needs a token and an authorized chat. Reports every missing
    /// value at once.
    pub fn require_chat(&self) -> Result<(String, i64), ConfigError> {
        match (&self.telegram_token, self.chat_id) {
            (Some(token), Some(chat_id)) => Ok((token.clone(), chat_id)),
            (token, chat_id) => {
                let mut missing = Vec::new();
                if token.is_none() {
                    missing.push("TELEGRAM_BOT_TOKEN".to_string());
                }
                if chat_id.is_none() {
                    missing.push("TELEGRAM_CHAT_ID".to_string());
                }
                Err(ConfigError::Missing(missing))
            }
        }
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }
}

/// `PROJECT_MY_APP` → `my-app`.
pub fn project_key_from_env(key: &str) -> Option<String> {
    let name = key.strip_prefix(PROJECT_ENV_PREFIX)?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase().replace('_', "-"))
}
