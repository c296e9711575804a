//! In-memory collaborators for orchestrator and dispatcher tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use crate::agent::{AgentEvent, AgentOutcome, AgentRequest, CodingAgent};
use crate::chat::ChatSink;
use crate::errors::GitError;
use crate::git::VersionControl;
use crate::github::{Issue, IssueTracker, PullRequestCreator, PullRequestDraft};
use crate::session::SessionRegistry;
use crate::workflow::{Collaborators, Orchestrator, WorkflowSettings};

pub const DEMO_PATH: &str = "/srv/checkouts/demo";

#[derive(Debug, Default)]
struct VcsState {
    branches: Vec<String>,
    changed: Vec<String>,
    calls: Vec<String>,
    fail_create: bool,
    fail_listing: bool,
}

type CallHook = Box<dyn Fn(&str) + Send + Sync>;

/// Records every git operation as a short command string.
pub struct FakeVcs {
    state: Mutex<VcsState>,
    hook: Mutex<Option<CallHook>>,
}

impl FakeVcs {
    pub fn new(branches: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(VcsState {
                branches: branches.iter().map(|b| b.to_string()).collect(),
                ..VcsState::default()
            }),
            hook: Mutex::new(None),
        })
    }

    pub fn failing_branch_creation(branches: &[&str]) -> Arc<Self> {
        let vcs = Self::new(branches);
        vcs.state.lock().unwrap().fail_create = true;
        vcs
    }

    /// `list_branches` errors, but single-branch lookups still work.
    pub fn failing_listing(branches: &[&str]) -> Arc<Self> {
        let vcs = Self::new(branches);
        vcs.state.lock().unwrap().fail_listing = true;
        vcs
    }

    /// Simulate the agent touching a file.
    pub fn touch(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        if !state.changed.iter().any(|p| p == path) {
            state.changed.push(path.to_string());
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls().iter().any(|c| c == call)
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    /// Run `hook` after every recorded call.
    pub fn on_call(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call.clone());
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(&call);
        }
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn changed_files(&self, _repo: &Path) -> Result<Vec<String>, GitError> {
        Ok(self.state.lock().unwrap().changed.clone())
    }

    async fn commit_all(&self, _repo: &Path, message: &str) -> Result<(), GitError> {
        self.record(format!("commit {}", message));
        self.state.lock().unwrap().changed.clear();
        Ok(())
    }

    async fn push(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(format!("push {}", branch));
        Ok(())
    }

    async fn pull(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(format!("pull {}", branch));
        Err(GitError::CommandFailed {
            command: format!("pull origin {}", branch),
            stderr: "Could not resolve host: github.com".into(),
        })
    }

    async fn checkout(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(format!("checkout {}", branch));
        Ok(())
    }

    async fn create_branch(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(format!("checkout -b {}", branch));
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(GitError::CommandFailed {
                command: format!("checkout -b {}", branch),
                stderr: "fatal: cannot lock ref".into(),
            });
        }
        state.branches.push(branch.to_string());
        Ok(())
    }

    async fn delete_branch(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(format!("branch -D {}", branch));
        self.state.lock().unwrap().branches.retain(|b| b != branch);
        Ok(())
    }

    async fn list_branches(&self, _repo: &Path) -> Result<Vec<String>, GitError> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(GitError::CommandFailed {
                command: "branch --list".into(),
                stderr: "fatal: bad object refs/heads".into(),
            });
        }
        Ok(state.branches.clone())
    }

    async fn branch_exists(&self, _repo: &Path, branch: &str) -> Result<bool, GitError> {
        Ok(self.state.lock().unwrap().branches.iter().any(|b| b == branch))
    }
}

/// Replays a fixed list of events, optionally touching files in a
/// [`FakeVcs`] for every edit, then finishes, fails or waits to be cancelled.
pub struct FakeAgent {
    pub events: Vec<AgentEvent>,
    pub vcs: Option<Arc<FakeVcs>>,
    pub cost: f64,
    pub fail_with: Option<String>,
    pub wait_for_cancel: bool,
    pub instructions: Mutex<Vec<String>>,
}

impl FakeAgent {
    pub fn editing(vcs: &Arc<FakeVcs>, files: &[&str]) -> Self {
        Self {
            events: files
                .iter()
                .map(|f| AgentEvent::tool_use("Edit", Some(f)))
                .collect(),
            vcs: Some(Arc::clone(vcs)),
            cost: 0.042,
            fail_with: None,
            wait_for_cancel: false,
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn idle() -> Self {
        Self {
            events: vec![AgentEvent::tool_use("Read", Some("README.md"))],
            vcs: None,
            cost: 0.01,
            fail_with: None,
            wait_for_cancel: false,
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodingAgent for FakeAgent {
    async fn run(
        &self,
        request: AgentRequest,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<AgentOutcome> {
        self.instructions
            .lock()
            .unwrap()
            .push(request.instruction.clone());

        for event in &self.events {
            if let (Some(vcs), AgentEvent::ToolUse { name, file_path: Some(path), .. }) =
                (&self.vcs, event)
                && crate::stream::is_edit_tool(name)
            {
                vcs.touch(path);
            }
            if events.send(event.clone()).await.is_err() {
                return Ok(AgentOutcome::cancelled());
            }
        }

        if self.wait_for_cancel {
            request.cancellation.cancelled().await;
            return Ok(AgentOutcome::cancelled());
        }
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }
        Ok(AgentOutcome {
            total_cost_usd: Some(self.cost),
            num_turns: Some(3),
            ..AgentOutcome::default()
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeIssues {
    pub issue: Option<Issue>,
    pub lookups: Mutex<Vec<u64>>,
}

impl FakeIssues {
    pub fn with(issue: Issue) -> Self {
        Self {
            issue: Some(issue),
            lookups: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IssueTracker for FakeIssues {
    async fn get_issue(&self, _repo: &Path, number: u64) -> Option<Issue> {
        self.lookups.lock().unwrap().push(number);
        self.issue.clone().filter(|i| i.number == number)
    }
}

/// Blocks every lookup until [`GatedIssues::open`] is called.
#[derive(Debug, Default)]
pub struct GatedIssues {
    entered: Notify,
    gate: Notify,
}

impl GatedIssues {
    /// Wait until a lookup is in flight.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl IssueTracker for GatedIssues {
    async fn get_issue(&self, _repo: &Path, _number: u64) -> Option<Issue> {
        self.entered.notify_one();
        self.gate.notified().await;
        None
    }
}

#[derive(Debug, Default)]
pub struct FakePulls {
    pub url: Option<String>,
    pub drafts: Mutex<Vec<(String, PullRequestDraft)>>,
}

impl FakePulls {
    pub fn returning(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            drafts: Mutex::new(Vec::new()),
        }
    }

    pub fn drafts(&self) -> Vec<(String, PullRequestDraft)> {
        self.drafts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequestCreator for FakePulls {
    async fn create_pull_request(
        &self,
        _repo: &Path,
        branch: &str,
        draft: &PullRequestDraft,
    ) -> Option<String> {
        self.drafts
            .lock()
            .unwrap()
            .push((branch.to_string(), draft.clone()));
        self.url.clone()
    }
}

/// Collects every message sent to chat.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_exact(&self, text: &str) -> usize {
        self.messages().iter().filter(|m| *m == text).count()
    }

    pub fn any_contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl ChatSink for RecordingSink {
    async fn send_message(&self, text: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn demo_projects() -> BTreeMap<String, PathBuf> {
    let mut projects = BTreeMap::new();
    projects.insert("demo".to_string(), PathBuf::from(DEMO_PATH));
    projects.insert("site".to_string(), PathBuf::from("/srv/checkouts/site"));
    projects
}

pub fn orchestrator(
    vcs: Arc<FakeVcs>,
    agent: Arc<FakeAgent>,
    issues: Arc<FakeIssues>,
    pulls: Arc<FakePulls>,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        Arc::new(SessionRegistry::new()),
        demo_projects(),
        Collaborators {
            vcs,
            issues,
            pulls,
            agent,
        },
        WorkflowSettings::default(),
    ))
}
