//! Task requests as they arrive from chat or the command line.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

/// Words that mark an `Auto` prompt as a feature rather than a fix.
static FEATURE_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(add|implement|create)\b").expect("feature keyword regex is valid")
});

/// What kind of change a task asks for. `Auto` is resolved from the prompt
/// text before a branch is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Feature,
    Fix,
    Auto,
}

impl TaskKind {
    /// Resolve `Auto` using keyword heuristics; `Feature` and `Fix` pass through.
    pub fn resolve(self, prompt: &str) -> TaskKind {
        match self {
            TaskKind::Auto if FEATURE_KEYWORDS.is_match(prompt) => TaskKind::Feature,
            TaskKind::Auto => TaskKind::Fix,
            other => other,
        }
    }

    /// Branch name prefix for a resolved kind.
    pub fn branch_prefix(self) -> &'static str {
        match self {
            TaskKind::Feature => "feature",
            TaskKind::Fix | TaskKind::Auto => "fix",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Feature => write!(f, "feature"),
            TaskKind::Fix => write!(f, "fix"),
            TaskKind::Auto => write!(f, "auto"),
        }
    }
}

/// A request to run one task against one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub project: String,
    pub kind: TaskKind,
    pub issue_number: Option<u64>,
    pub prompt: Option<String>,
}

impl TaskRequest {
    pub fn from_issue(project: impl Into<String>, issue_number: u64) -> Self {
        Self {
            project: project.into(),
            kind: TaskKind::Fix,
            issue_number: Some(issue_number),
            prompt: None,
        }
    }

    pub fn from_prompt(
        project: impl Into<String>,
        kind: TaskKind,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            kind,
            issue_number: None,
            prompt: Some(prompt.into()),
        }
    }

    /// Exactly one of issue number and prompt must be present, and an issue
    /// number must be positive.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let prompt = self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty());
        match (self.issue_number, prompt) {
            (Some(0), _) => Err(WorkflowError::InvalidTask(
                "issue number must be positive".into(),
            )),
            (Some(_), Some(_)) => Err(WorkflowError::InvalidTask(
                "give either an issue number or a prompt, not both".into(),
            )),
            (None, None) => Err(WorkflowError::InvalidTask(
                "need a prompt or an issue number".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Short description used in the "starting" message.
    pub fn describe(&self) -> String {
        match (self.issue_number, self.prompt.as_deref()) {
            (Some(n), _) => format!("Fix #{}", n),
            (None, Some(prompt)) => prompt.trim().to_string(),
            (None, None) => String::new(),
        }
    }
}
