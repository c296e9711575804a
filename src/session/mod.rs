//! Live records of in-flight tasks.
//!
//! A [`Session`] is created when a task is admitted, shared (via `Arc`)
//! between the [`SessionRegistry`] and the orchestrator driving it, and
//! removed from the registry when the pipeline reaches a terminal state.

pub mod registry;

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::task::TaskKind;
use crate::workflow::WorkflowState;

pub use registry::SessionRegistry;

/// Immutable facts recorded at admission.
#[derive(Debug, Clone, Copy)]
pub struct SessionMeta {
    pub kind: TaskKind,
    pub issue_number: Option<u64>,
}

/// Fields mutated while the task runs.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub workflow_state: WorkflowState,
    pub branch_name: Option<String>,
    pub pull_request_url: Option<String>,
    /// Paths the agent edited, as reported by its event stream. Only grows.
    pub edited_files: BTreeSet<String>,
    pub last_activity: Option<String>,
    pub issue_title: Option<String>,
}

pub struct Session {
    id: Uuid,
    project: String,
    meta: SessionMeta,
    started_at: DateTime<Utc>,
    start: Instant,
    cancellation: CancellationToken,
    state: Mutex<SessionState>,
}

/// Point-in-time view of a session for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub project: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub edited_file_count: usize,
    pub branch_name: Option<String>,
    pub state: WorkflowState,
}

impl Session {
    pub fn new(project: impl Into<String>, meta: SessionMeta) -> Self {
        Self {
            id: Uuid::new_v4(),
            project: project.into(),
            meta,
            started_at: Utc::now(),
            start: Instant::now(),
            cancellation: CancellationToken::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn kind(&self) -> TaskKind {
        self.meta.kind
    }

    pub fn issue_number(&self) -> Option<u64> {
        self.meta.issue_number
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Monotonic start time; the progress throttle measures from here.
    pub fn start_instant(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // State is plain data; a panic mid-update cannot leave it unusable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn record_edit(&self, path: impl Into<String>) {
        self.lock().edited_files.insert(path.into());
    }

    pub fn set_activity(&self, label: impl Into<String>) {
        self.lock().last_activity = Some(label.into());
    }

    pub fn set_branch(&self, branch: impl Into<String>) {
        self.lock().branch_name = Some(branch.into());
    }

    pub fn set_pull_request_url(&self, url: impl Into<String>) {
        self.lock().pull_request_url = Some(url.into());
    }

    pub fn set_issue_title(&self, title: impl Into<String>) {
        self.lock().issue_title = Some(title.into());
    }

    pub fn set_workflow_state(&self, state: WorkflowState) {
        self.lock().workflow_state = state;
    }

    pub fn edited_file_count(&self) -> usize {
        self.lock().edited_files.len()
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.lock();
        SessionSummary {
            project: self.project.clone(),
            started_at: self.started_at,
            elapsed_seconds: self.elapsed().as_secs(),
            edited_file_count: state.edited_files.len(),
            branch_name: state.branch_name.clone(),
            state: state.workflow_state,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("project", &self.project)
            .field("meta", &self.meta)
            .field("started_at", &self.started_at)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
