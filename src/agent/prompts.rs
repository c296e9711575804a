//! Instruction text handed to the coding agent.

use crate::github::Issue;

/// Appended to the agent's system prompt on every run.
pub const SYSTEM_PROMPT_APPEND: &str = "After completing your work, do NOT commit, push, or create PRs.
Only make the code changes. The orchestrator handles git operations.
Follow existing project patterns. Write production-ready code.";

/// The task prompt for an issue-linked run.
pub fn issue_prompt(number: u64, issue: Option<&Issue>) -> String {
    match issue {
        Some(issue) => format!("Fix issue #{}: {}", number, issue.title),
        None => format!("Fix issue #{}", number),
    }
}

/// Enrich the task prompt with issue context when there is any.
pub fn build_instruction(prompt: &str, issue: Option<&Issue>) -> String {
    let mut parts = vec![prompt.to_string()];
    if let Some(issue) = issue {
        parts.push(format!("\nGitHub Issue #{}: {}", issue.number, issue.title));
        if !issue.body.is_empty() {
            parts.push(format!("\nIssue description:\n{}", issue.body));
        }
        if !issue.labels.is_empty() {
            parts.push(format!("Labels: {}", issue.labels.join(", ")));
        }
    }
    parts.join("\n")
}
