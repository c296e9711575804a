//! Outbound chat message text.

use crate::session::SessionSummary;

pub const NO_CHANGES: &str = "No changes made. Cleaning up branch.";
pub const NO_ACTIVE_SESSIONS: &str = "No active sessions.";
pub const USAGE: &str = "Usage: /fix <project> <issue#>\n/feat <project> <description>\n/code <project> <prompt>";
pub const MISSING_TASK: &str = "Need a prompt or issue number.\nE.g.: /fix demo 23\n/feat demo add dark mode";
pub const CANCEL_USAGE: &str = "Usage: /cancel <project>";

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub project: String,
    pub branch: String,
    pub files_changed: usize,
    pub elapsed_secs: u64,
    pub cost_usd: f64,
    pub pr_url: Option<String>,
    pub cancelled: bool,
}

pub fn starting(project: &str, task: &str) -> String {
    format!("Starting {}...\nTask: {}", project, task)
}

pub fn branch_created(branch: &str) -> String {
    format!("Branch: `{}`", branch)
}

pub fn progress(elapsed_secs: u64, activity: Option<&str>, files: usize) -> String {
    format!(
        "[{}s] {}\nFiles: {}",
        elapsed_secs,
        activity.unwrap_or("Working..."),
        files
    )
}

pub fn complete(report: &CompletionReport) -> String {
    let mut lines = vec![format!("Done: {}", report.project)];
    if report.cancelled {
        lines.push("Cancelled: partial changes committed".to_string());
    }
    lines.push(format!("Branch: `{}`", report.branch));
    lines.push(format!("Files: {}", report.files_changed));
    lines.push(format!(
        "Time: {}s | Cost: ${:.3}",
        report.elapsed_secs, report.cost_usd
    ));
    if let Some(url) = &report.pr_url {
        lines.push(format!("PR: {}", url));
    }
    lines.join("\n")
}

pub fn error(message: impl std::fmt::Display) -> String {
    format!("Error: {}", message)
}

pub fn status(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return NO_ACTIVE_SESSIONS.to_string();
    }
    sessions
        .iter()
        .map(|s| {
            let branch = s
                .branch_name
                .as_deref()
                .map(|b| format!(" ({})", b))
                .unwrap_or_default();
            format!(
                "{}: {}s, {} files{}",
                s.project, s.elapsed_seconds, s.edited_file_count, branch
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn project_list<S: AsRef<str>>(projects: &[S]) -> String {
    projects
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn cancelled(project: &str) -> String {
    format!("Cancelled {}.", project)
}

pub fn no_session(project: &str) -> String {
    format!("No active session for {}.", project)
}

pub fn help() -> String {
    format!(
        "{}\n/status - active sessions\n/cancel <project> - stop a running task\n/projects - configured projects",
        USAGE
    )
}
