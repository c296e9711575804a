//! Typed error hierarchy for relay.
//!
//! Three top-level enums cover the three seams:
//! - `WorkflowError` — everything the orchestrator reports back to chat
//! - `GitError` — failures from the version-control collaborator
//! - `ConfigError` — configuration loading and validation

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the workflow orchestrator. Every variant is rendered
/// as a single chat message; none of them terminate the process.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{project} already has an active session.")]
    AlreadyActive { project: String },

    #[error("Unknown project: {project}\nAvailable: {}", .available.join(", "))]
    UnknownProject {
        project: String,
        available: Vec<String>,
    },

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Failed to create branch {branch}: {source}")]
    BranchCreationFailed {
        branch: String,
        #[source]
        source: GitError,
    },

    #[error("Agent run failed: {0:#}")]
    AgentRunFailed(#[source] anyhow::Error),

    #[error("Workflow failed: {0:#}")]
    WorkflowFailed(#[source] anyhow::Error),
}

impl From<GitError> for WorkflowError {
    fn from(err: GitError) -> Self {
        WorkflowError::WorkflowFailed(err.into())
    }
}

/// Errors from git operations. `CommandFailed` carries the diagnostic text
/// git printed on stderr.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] git2::Error),

    #[error("Git task panicked: {0}")]
    Join(String),
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Missing configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("No projects configured. Set PROJECT_<NAME>=<path> or add a [projects] table.")]
    NoProjects,

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_active_message_names_project() {
        let err = WorkflowError::AlreadyActive {
            project: "demo".into(),
        };
        assert_eq!(err.to_string(), "demo already has an active session.");
    }

    #[test]
    fn unknown_project_lists_available_projects() {
        let err = WorkflowError::UnknownProject {
            project: "nope".into(),
            available: vec!["demo".into(), "site".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Unknown project: nope"));
        assert!(msg.contains("Available: demo, site"));
    }

    #[test]
    fn branch_creation_failed_carries_git_diagnostic() {
        let err = WorkflowError::BranchCreationFailed {
            branch: "fix/42".into(),
            source: GitError::CommandFailed {
                command: "checkout -b fix/42".into(),
                stderr: "fatal: not a git repository".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("fix/42"));
        assert!(msg.contains("not a git repository"));
    }

    #[test]
    fn agent_run_failed_renders_context_chain() {
        let inner = anyhow::anyhow!("exit status 1").context("claude process failed");
        let err = WorkflowError::AgentRunFailed(inner);
        let msg = err.to_string();
        assert!(msg.contains("claude process failed"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn git_error_converts_to_workflow_failed() {
        let err: WorkflowError = GitError::CommandFailed {
            command: "push -u origin fix/1".into(),
            stderr: "remote rejected".into(),
        }
        .into();
        assert!(matches!(err, WorkflowError::WorkflowFailed(_)));
        assert!(err.to_string().contains("remote rejected"));
    }

    #[test]
    fn config_missing_joins_keys() {
        let err =
            ConfigError::Missing(vec!["TELEGRAM_BOT_TOKEN".into(), "TELEGRAM_CHAT_ID".into()]);
        assert_eq!(
            err.to_string(),
            "Missing configuration: TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID"
        );
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WorkflowError::InvalidTask("x".into()));
        assert_std_error(&GitError::Join("x".into()));
        assert_std_error(&ConfigError::NoProjects);
    }
}
