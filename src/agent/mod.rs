//! The coding-agent seam.
//!
//! An agent run takes an instruction and a working directory, streams
//! [`AgentEvent`]s into a channel while it works, and returns an
//! [`AgentOutcome`] when the stream ends.

pub mod claude;
pub mod prompts;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use claude::ClaudeCli;

pub const DEFAULT_ALLOWED_TOOLS: &[&str] =
    &["Read", "Edit", "Write", "Glob", "Grep", "Bash", "Task"];
pub const DEFAULT_MAX_TURNS: u32 = 50;
pub const DEFAULT_MAX_BUDGET_USD: f64 = 5.0;

/// How the agent asks for permission before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionMode {
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    /// Unattended runs: no prompts at all.
    #[default]
    #[serde(rename = "bypassPermissions")]
    BypassPermissions,
    #[serde(rename = "plan")]
    Plan,
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionMode::Default => write!(f, "default"),
            PermissionMode::AcceptEdits => write!(f, "acceptEdits"),
            PermissionMode::BypassPermissions => write!(f, "bypassPermissions"),
            PermissionMode::Plan => write!(f, "plan"),
        }
    }
}

/// Something the agent did, as surfaced to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    ToolUse {
        name: String,
        file_path: Option<String>,
        /// Human-readable label, e.g. `Editing: src/login.ts`.
        description: String,
    },
    Notification { message: String },
}

impl AgentEvent {
    pub fn tool_use(name: impl Into<String>, file_path: Option<&str>) -> Self {
        let name = name.into();
        let input = match file_path {
            Some(path) => serde_json::json!({ "file_path": path }),
            None => serde_json::Value::Null,
        };
        AgentEvent::ToolUse {
            description: crate::stream::describe_tool_use(&name, &input),
            file_path: file_path.map(str::to_string),
            name,
        }
    }

    pub fn notification(message: impl Into<String>) -> Self {
        AgentEvent::Notification {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub instruction: String,
    pub working_dir: PathBuf,
    pub allowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    pub max_turns: u32,
    pub max_budget_usd: f64,
    pub cancellation: CancellationToken,
}

/// Result of one agent run, taken from its terminal record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutcome {
    pub total_cost_usd: Option<f64>,
    pub num_turns: Option<u32>,
    /// The agent reported an error result (budget or turn limit, API error).
    /// The working tree may still hold useful edits.
    pub is_error: bool,
    pub result: Option<String>,
    /// The run stopped because its cancellation token fired.
    pub cancelled: bool,
}

impl AgentOutcome {
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }
}

/// A coding agent that edits files in a working directory.
///
/// Implementations send events on `events` while running and must stop
/// promptly when `request.cancellation` fires. A closed `events` channel
/// means the consumer has stopped listening; the run should wind down.
#[async_trait]
pub trait CodingAgent: Send + Sync {
    async fn run(
        &self,
        request: AgentRequest,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<AgentOutcome>;
}
