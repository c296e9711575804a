use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::{Session, SessionMeta, SessionSummary};
use crate::errors::WorkflowError;

/// Process-wide table of active sessions, at most one per project.
///
/// The project's checkout is a single mutable working tree, so this table
/// is the only lock standing between two tasks and interleaved branch or
/// commit operations. Admission is a check-and-insert under one mutex.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a new session for `project`. Fails with `AlreadyActive` when
    /// the project already has one.
    pub fn create(&self, project: &str, meta: SessionMeta) -> Result<Arc<Session>, WorkflowError> {
        let mut sessions = self.lock();
        if sessions.contains_key(project) {
            return Err(WorkflowError::AlreadyActive {
                project: project.to_string(),
            });
        }
        let session = Arc::new(Session::new(project, meta));
        sessions.insert(project.to_string(), Arc::clone(&session));
        info!(project, session_id = %session.id(), "session admitted");
        Ok(session)
    }

    pub fn get(&self, project: &str) -> Option<Arc<Session>> {
        self.lock().get(project).cloned()
    }

    pub fn is_active(&self, project: &str) -> bool {
        self.lock().contains_key(project)
    }

    /// Remove whatever session is registered for `project`. Removing an
    /// absent session is a no-op.
    pub fn remove(&self, project: &str) {
        if self.lock().remove(project).is_some() {
            debug!(project, "session removed");
        }
    }

    /// Remove `session` only if it is still the one registered for its
    /// project. A cancelled session's late cleanup must not evict a newer
    /// session admitted for the same project in the meantime.
    pub fn release(&self, session: &Session) -> bool {
        let mut sessions = self.lock();
        match sessions.get(session.project()) {
            Some(current) if current.id() == session.id() => {
                sessions.remove(session.project());
                debug!(project = session.project(), session_id = %session.id(), "session released");
                true
            }
            _ => false,
        }
    }

    /// Signal the session's cancellation token and drop it from the table.
    /// Returns whether a session was found.
    ///
    /// The slot frees immediately, but the cancelled run may still be
    /// committing, pushing or restoring the checkout. A run admitted for the
    /// same project right away can race it on the working tree; callers that
    /// need the tree quiet should wait for the old run to finish (see
    /// `Dispatcher::shutdown`).
    pub fn cancel(&self, project: &str) -> bool {
        let removed = self.lock().remove(project);
        match removed {
            Some(session) => {
                session.cancellation().cancel();
                info!(project, session_id = %session.id(), "session cancelled");
                true
            }
            None => false,
        }
    }

    /// Snapshot of every active session, ordered by project key.
    pub fn list_active(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> = self.lock().values().cloned().collect();
        let mut summaries: Vec<SessionSummary> = sessions.iter().map(|s| s.summary()).collect();
        summaries.sort_by(|a, b| a.project.cmp(&b.project));
        summaries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
