//! The single-session workflow orchestrator.
//!
//! One admitted task runs through:
//!
//! ```text
//! Admitted → IssueLookup → Branching → Running → DiffCheck
//!     → NoOp
//!     → Committing → Pushing → PrCreation → Reporting → Released
//! ```
//!
//! Any failure ends the run as `Failed` with one `Error: ...` chat message.
//! The registry slot is released on every path by [`ReleaseGuard`].

pub mod state;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::agent::{
    AgentOutcome, AgentRequest, CodingAgent, DEFAULT_ALLOWED_TOOLS, DEFAULT_MAX_BUDGET_USD,
    DEFAULT_MAX_TURNS, PermissionMode, prompts,
};
use crate::branch::{BranchRequest, derive_branch_name};
use crate::chat::format::{self, CompletionReport};
use crate::chat::{ChatSink, send_best_effort};
use crate::errors::WorkflowError;
use crate::git::VersionControl;
use crate::github::{Issue, IssueTracker, PullRequestCreator, PullRequestDraft, commit_message};
use crate::progress::{PROGRESS_INTERVAL, ProgressNotifier};
use crate::session::{Session, SessionMeta, SessionRegistry};
use crate::task::TaskRequest;

pub use state::WorkflowState;

/// Knobs for the agent run and progress cadence.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub allowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    pub max_turns: u32,
    pub max_budget_usd: f64,
    pub progress_interval: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            allowed_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|s| s.to_string()).collect(),
            permission_mode: PermissionMode::BypassPermissions,
            max_turns: DEFAULT_MAX_TURNS,
            max_budget_usd: DEFAULT_MAX_BUDGET_USD,
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

/// The external systems a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub vcs: Arc<dyn VersionControl>,
    pub issues: Arc<dyn IssueTracker>,
    pub pulls: Arc<dyn PullRequestCreator>,
    pub agent: Arc<dyn CodingAgent>,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The agent left the tree untouched; the branch was deleted.
    NoChanges,
    /// Cancelled before the agent started. The tree is back on the main
    /// branch.
    Cancelled,
    Completed(CompletionReport),
}

/// Removes the session from the registry when dropped, but only if it is
/// still the registered session for its project.
struct ReleaseGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.registry.release(&self.session);
    }
}

/// A task that passed admission and owns its registry slot.
pub struct AdmittedTask {
    request: TaskRequest,
    repo: PathBuf,
    session: Arc<Session>,
    _guard: ReleaseGuard,
}

impl AdmittedTask {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn request(&self) -> &TaskRequest {
        &self.request
    }
}

pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    projects: BTreeMap<String, PathBuf>,
    collaborators: Collaborators,
    settings: WorkflowSettings,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        projects: BTreeMap<String, PathBuf>,
        collaborators: Collaborators,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            registry,
            projects,
            collaborators,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    /// Validate the request, resolve its project and claim the project's
    /// registry slot. Nothing touches the working tree before this succeeds.
    pub fn admit(&self, request: TaskRequest) -> Result<AdmittedTask, WorkflowError> {
        request.validate()?;
        let repo = self
            .projects
            .get(&request.project)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownProject {
                project: request.project.clone(),
                available: self.project_names(),
            })?;

        let session = self.registry.create(
            &request.project,
            SessionMeta {
                kind: request.kind,
                issue_number: request.issue_number,
            },
        )?;

        Ok(AdmittedTask {
            request,
            repo,
            _guard: ReleaseGuard {
                registry: Arc::clone(&self.registry),
                session: Arc::clone(&session),
            },
            session,
        })
    }

    /// Admit and drive in one step. Admission errors are returned without
    /// any chat message; the caller decides how to report them.
    pub async fn run(
        &self,
        request: TaskRequest,
        chat: &dyn ChatSink,
    ) -> Result<RunOutcome, WorkflowError> {
        let task = self.admit(request)?;
        self.drive(task, chat).await
    }

    /// Run an admitted task to a terminal state, reporting to `chat`.
    pub async fn drive(
        &self,
        task: AdmittedTask,
        chat: &dyn ChatSink,
    ) -> Result<RunOutcome, WorkflowError> {
        let session = Arc::clone(&task.session);
        let project = session.project().to_string();
        info!(
            project = %project,
            session_id = %session.id(),
            task = %task.request.describe(),
            "run started"
        );
        send_best_effort(chat, &format::starting(&project, &task.request.describe())).await;

        let result = self.execute(&task, chat).await;
        match &result {
            Ok(RunOutcome::NoChanges) => {
                session.set_workflow_state(WorkflowState::NoOp);
                info!(project = %project, "run finished without changes");
            }
            Ok(RunOutcome::Cancelled) => {
                session.set_workflow_state(WorkflowState::Cancelled);
                info!(project = %project, "run cancelled before the agent started");
            }
            Ok(RunOutcome::Completed(report)) => {
                let terminal = if report.cancelled {
                    WorkflowState::Cancelled
                } else {
                    WorkflowState::Released
                };
                session.set_workflow_state(terminal);
                info!(
                    project = %project,
                    branch = %report.branch,
                    files = report.files_changed,
                    cancelled = report.cancelled,
                    "run completed"
                );
            }
            Err(e) => {
                session.set_workflow_state(WorkflowState::Failed);
                error!(project = %project, error = %e, "run failed");
                send_best_effort(chat, &format::error(e)).await;
            }
        }

        drop(task);
        result
    }

    async fn execute(
        &self,
        task: &AdmittedTask,
        chat: &dyn ChatSink,
    ) -> Result<RunOutcome, WorkflowError> {
        let session = task.session.as_ref();
        let repo = task.repo.as_path();
        let vcs = &self.collaborators.vcs;

        let (prompt, issue) = self.resolve_prompt(task).await;
        // A cancelled session no longer owns the checkout.
        if session.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let (branch, base) = self.prepare_branch(task, repo, &prompt).await?;
        session.set_branch(&branch);
        if session.is_cancelled() {
            vcs.checkout(repo, &base).await?;
            vcs.delete_branch(repo, &branch).await?;
            return Ok(RunOutcome::Cancelled);
        }
        send_best_effort(chat, &format::branch_created(&branch)).await;

        transition(session, WorkflowState::Running);
        let instruction = prompts::build_instruction(&prompt, issue.as_ref());
        let outcome = self.run_agent(session, repo, instruction, chat).await?;
        if outcome.is_error {
            warn!(
                project = session.project(),
                result = outcome.result.as_deref().unwrap_or(""),
                "agent reported an error result, checking for partial changes"
            );
        }

        transition(session, WorkflowState::DiffCheck);
        let changed = vcs.changed_files(repo).await?;
        if changed.is_empty() {
            transition(session, WorkflowState::NoOp);
            send_best_effort(chat, format::NO_CHANGES).await;
            vcs.checkout(repo, &base).await?;
            vcs.delete_branch(repo, &branch).await?;
            return Ok(RunOutcome::NoChanges);
        }

        let cancelled = outcome.cancelled || session.is_cancelled();

        transition(session, WorkflowState::Committing);
        vcs.commit_all(repo, &commit_message(&prompt, task.request.issue_number))
            .await?;

        transition(session, WorkflowState::Pushing);
        vcs.push(repo, &branch).await?;

        transition(session, WorkflowState::PrCreation);
        let draft = PullRequestDraft::compose(
            &prompt,
            task.request.issue_number,
            issue.as_ref(),
            &changed,
            &base,
            cancelled,
        );
        let pr_url = self
            .collaborators
            .pulls
            .create_pull_request(repo, &branch, &draft)
            .await;
        if let Some(url) = &pr_url {
            session.set_pull_request_url(url);
        }

        transition(session, WorkflowState::Reporting);
        let report = CompletionReport {
            project: session.project().to_string(),
            branch,
            files_changed: changed.len(),
            elapsed_secs: session.elapsed().as_secs(),
            cost_usd: outcome.total_cost_usd.unwrap_or(0.0),
            pr_url,
            cancelled,
        };
        send_best_effort(chat, &format::complete(&report)).await;
        Ok(RunOutcome::Completed(report))
    }

    /// Look up the issue (if any) and settle the task prompt.
    async fn resolve_prompt(&self, task: &AdmittedTask) -> (String, Option<Issue>) {
        let Some(number) = task.request.issue_number else {
            let prompt = task.request.prompt.as_deref().unwrap_or_default().trim();
            return (prompt.to_string(), None);
        };

        transition(&task.session, WorkflowState::IssueLookup);
        let issue = self.collaborators.issues.get_issue(&task.repo, number).await;
        match &issue {
            Some(issue) => task.session.set_issue_title(&issue.title),
            None => warn!(
                project = task.session.project(),
                issue = number,
                "proceeding without issue details"
            ),
        }
        (prompts::issue_prompt(number, issue.as_ref()), issue)
    }

    /// Check out a fresh task branch from the main branch. Returns the task
    /// branch and the main branch it was cut from.
    async fn prepare_branch(
        &self,
        task: &AdmittedTask,
        repo: &Path,
        prompt: &str,
    ) -> Result<(String, String), WorkflowError> {
        transition(&task.session, WorkflowState::Branching);
        let vcs = &self.collaborators.vcs;

        let existing = match vcs.list_branches(repo).await {
            Ok(branches) => branches,
            Err(e) => {
                warn!(error = %e, "could not list branches");
                Vec::new()
            }
        };
        let plan = derive_branch_name(
            &BranchRequest {
                issue_number: task.request.issue_number,
                kind: task.request.kind,
                prompt: Some(prompt),
            },
            &existing,
        );
        let failed = |source| WorkflowError::BranchCreationFailed {
            branch: plan.name.clone(),
            source,
        };

        let base = vcs.discover_main_branch(repo).await;
        vcs.checkout(repo, &base).await.map_err(failed)?;
        if let Err(e) = vcs.pull(repo, &base).await {
            // Offline is fine; branch from whatever main we have.
            warn!(branch = %base, error = %e, "pull failed");
        }
        // The listing may have failed; ask again for this one name.
        let stale = plan.replaces_existing
            || matches!(vcs.branch_exists(repo, &plan.name).await, Ok(true));
        if stale {
            info!(branch = %plan.name, "deleting stale branch");
            vcs.delete_branch(repo, &plan.name).await.map_err(failed)?;
        }
        vcs.create_branch(repo, &plan.name).await.map_err(failed)?;
        info!(
            project = task.session.project(),
            branch = %plan.name,
            base = %base,
            "branch created"
        );

        Ok((plan.name, base))
    }

    /// Drive the agent, draining its events through the progress notifier
    /// until the stream ends or the session is cancelled.
    async fn run_agent(
        &self,
        session: &Session,
        repo: &Path,
        instruction: String,
        chat: &dyn ChatSink,
    ) -> Result<AgentOutcome, WorkflowError> {
        let token = session.cancellation().clone();
        let request = AgentRequest {
            instruction,
            working_dir: repo.to_path_buf(),
            allowed_tools: self.settings.allowed_tools.clone(),
            permission_mode: self.settings.permission_mode,
            max_turns: self.settings.max_turns,
            max_budget_usd: self.settings.max_budget_usd,
            cancellation: token.clone(),
        };

        let (tx, mut rx) = mpsc::channel(1);
        let mut notifier = ProgressNotifier::new(session, self.settings.progress_interval);
        let mut run = self.collaborators.agent.run(request, tx);
        let mut result = None;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(project = session.project(), "cancellation observed, stopping agent");
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if token.is_cancelled() {
                        break;
                    }
                    if let Some(message) = notifier.on_event(&event, session) {
                        send_best_effort(chat, &message).await;
                    }
                }
                finished = &mut run, if result.is_none() => {
                    result = Some(finished);
                }
            }
        }

        // A closed channel tells the agent nobody is listening any more.
        drop(rx);
        let result = match result {
            Some(result) => result,
            None => run.await,
        };

        match result {
            Ok(outcome) => Ok(AgentOutcome {
                cancelled: outcome.cancelled || token.is_cancelled(),
                ..outcome
            }),
            Err(e) if token.is_cancelled() => {
                debug!(error = %format!("{:#}", e), "agent error after cancellation");
                Ok(AgentOutcome::cancelled())
            }
            Err(e) => Err(WorkflowError::AgentRunFailed(e)),
        }
    }
}

fn transition(session: &Session, state: WorkflowState) {
    debug!(project = session.project(), state = %state, "workflow transition");
    session.set_workflow_state(state);
}
