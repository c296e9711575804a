//! `relay run`: one task from the terminal, reported to stdout.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use relay::chat::{StdoutSink, format};
use relay::config::Config;
use relay::session::SessionRegistry;
use relay::task::{TaskKind, TaskRequest};
use relay::workflow::RunOutcome;

use super::build_orchestrator;

pub async fn cmd_run(
    config: Config,
    project: String,
    issue: Option<u64>,
    prompt: Option<String>,
    kind: TaskKind,
) -> Result<()> {
    config.require_projects()?;

    let request = match (issue, prompt) {
        (Some(number), _) => TaskRequest::from_issue(project.clone(), number),
        (None, Some(prompt)) => TaskRequest::from_prompt(project.clone(), kind, prompt),
        (None, None) => anyhow::bail!("Either --issue or --prompt is required"),
    };

    let registry = Arc::new(SessionRegistry::new());
    let orchestrator = build_orchestrator(&config, Arc::clone(&registry));

    // Ctrl-C cancels the run; partial edits are still committed.
    let cancel_registry = Arc::clone(&registry);
    let cancel_project = project.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(project = %cancel_project, "interrupt received, cancelling");
            cancel_registry.cancel(&cancel_project);
        }
    });

    let result = orchestrator.run(request, &StdoutSink).await;
    watcher.abort();

    match result? {
        RunOutcome::NoChanges => info!(project = %project, "run finished without changes"),
        RunOutcome::Cancelled => println!("{}", format::cancelled(&project)),
        RunOutcome::Completed(report) => {
            info!(project = %project, branch = %report.branch, pr = ?report.pr_url, "run finished")
        }
    }
    Ok(())
}
