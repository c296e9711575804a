//! Code-host collaborators: issue lookup and pull-request creation.

pub mod client;

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use client::GitHubClient;

/// Substituted for an issue with an empty body.
pub const NO_DESCRIPTION: &str = "No description provided";

const PR_TITLE_MAX: usize = 72;
const PR_FOOTER: &str = "\n---\n_Automated by relay_";
const CANCELLED_NOTE: &str =
    "> The run was cancelled before the agent finished; these are partial changes.";

static GITHUB_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com[:/](.+?)/(.+?)(\.git)?$").expect("remote url regex is valid")
});

/// A GitHub issue (subset of fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Best-effort issue lookup. `None` means "proceed without issue detail".
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn get_issue(&self, repo: &Path, number: u64) -> Option<Issue>;
}

/// Best-effort PR creation. `None` means no PR was opened; the pushed
/// branch stands on its own.
#[async_trait]
pub trait PullRequestCreator: Send + Sync {
    async fn create_pull_request(
        &self,
        repo: &Path,
        branch: &str,
        draft: &PullRequestDraft,
    ) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub base: String,
}

impl PullRequestDraft {
    /// Build the PR title and body for a finished run.
    pub fn compose(
        prompt: &str,
        issue_number: Option<u64>,
        issue: Option<&Issue>,
        changed_files: &[String],
        base: &str,
        cancelled: bool,
    ) -> Self {
        let title = match issue_number {
            Some(n) => format!(
                "Fix #{}: {}",
                n,
                issue.map(|i| i.title.as_str()).unwrap_or(prompt)
            ),
            None => pr_title_from_prompt(prompt),
        };

        let mut parts: Vec<String> = Vec::new();
        if let Some(n) = issue_number {
            parts.push(format!("Closes #{}", n));
        }
        if cancelled {
            parts.push(CANCELLED_NOTE.to_string());
        }
        parts.push("## Changes".to_string());
        parts.push(
            changed_files
                .iter()
                .map(|f| format!("- `{}`", f))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        parts.push(PR_FOOTER.to_string());

        Self {
            title,
            body: parts.join("\n\n"),
            base: base.to_string(),
        }
    }
}

fn pr_title_from_prompt(prompt: &str) -> String {
    if prompt.chars().count() > PR_TITLE_MAX {
        let head: String = prompt.chars().take(PR_TITLE_MAX - 3).collect();
        format!("{}...", head)
    } else {
        prompt.to_string()
    }
}

/// Parse `(owner, repo)` from a GitHub remote URL.
///
/// Handles `https://github.com/o/r(.git)`, token-embedded HTTPS URLs and
/// the SSH form `git@github.com:o/r.git`.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let caps = GITHUB_REMOTE.captures(url.trim())?;
    let owner = caps.get(1)?.as_str();
    let repo = caps.get(2)?.as_str();
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// The commit message for a run.
pub fn commit_message(prompt: &str, issue_number: Option<u64>) -> String {
    match issue_number {
        Some(n) => format!("Fix #{}: {}", n, prompt),
        None => prompt.to_string(),
    }
}
