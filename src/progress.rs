//! Rate-limited progress reporting.
//!
//! Agents emit tool calls far faster than anyone wants to read about them.
//! Every event updates the session; at most one status line per interval
//! goes out to chat.

use std::time::Duration;

use tokio::time::Instant;

use crate::agent::AgentEvent;
use crate::chat::format;
use crate::session::Session;
use crate::stream::is_edit_tool;

/// Default minimum gap between two progress messages for one session.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug)]
pub struct ProgressNotifier {
    interval: Duration,
    last_emit: Instant,
}

impl ProgressNotifier {
    /// The first message can go out one interval after the session started.
    pub fn new(session: &Session, interval: Duration) -> Self {
        Self {
            interval,
            last_emit: session.start_instant(),
        }
    }

    /// Fold `event` into the session and return a progress message if the
    /// interval has elapsed since the last one.
    pub fn on_event(&mut self, event: &AgentEvent, session: &Session) -> Option<String> {
        match event {
            AgentEvent::ToolUse {
                name,
                file_path,
                description,
            } => {
                if is_edit_tool(name)
                    && let Some(path) = file_path
                {
                    session.record_edit(path.as_str());
                }
                session.set_activity(description.as_str());
            }
            AgentEvent::Notification { message } => session.set_activity(message.as_str()),
        }

        let now = Instant::now();
        if now.duration_since(self.last_emit) < self.interval {
            return None;
        }
        self.last_emit = now;

        let state = session.snapshot();
        Some(format::progress(
            session.elapsed().as_secs(),
            state.last_activity.as_deref(),
            state.edited_files.len(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionMeta;
    use crate::task::TaskKind;

    fn session() -> Session {
        Session::new(
            "demo",
            SessionMeta {
                kind: TaskKind::Fix,
                issue_number: Some(42),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_emitted_before_the_first_interval() {
        let session = session();
        let mut notifier = ProgressNotifier::new(&session, PROGRESS_INTERVAL);

        tokio::time::advance(Duration::from_secs(19)).await;
        let event = AgentEvent::tool_use("Read", Some("/repo/src/login.ts"));
        assert!(notifier.on_event(&event, &session).is_none());
        assert_eq!(
            session.snapshot().last_activity.as_deref(),
            Some("Reading: src/login.ts")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn emits_once_interval_has_elapsed() {
        let session = session();
        let mut notifier = ProgressNotifier::new(&session, PROGRESS_INTERVAL);

        tokio::time::advance(PROGRESS_INTERVAL).await;
        let event = AgentEvent::tool_use("Edit", Some("/repo/src/login.ts"));
        let message = notifier.on_event(&event, &session).unwrap();
        assert_eq!(message, "[20s] Editing: src/login.ts\nFiles: 1");

        // The very next event is inside the new window.
        assert!(notifier.on_event(&event, &session).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_events_yields_at_most_one_message_per_interval() {
        let session = session();
        let mut notifier = ProgressNotifier::new(&session, PROGRESS_INTERVAL);
        let mut emitted = 0;

        for window in 0..3 {
            tokio::time::advance(PROGRESS_INTERVAL).await;
            for i in 0..1000 {
                let path = format!("src/file_{}_{}.rs", window, i % 10);
                let event = AgentEvent::tool_use("Write", Some(&path));
                if notifier.on_event(&event, &session).is_some() {
                    emitted += 1;
                }
            }
        }

        assert_eq!(emitted, 3);
        assert_eq!(session.edited_file_count(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn edited_files_have_set_semantics() {
        let session = session();
        let mut notifier = ProgressNotifier::new(&session, PROGRESS_INTERVAL);
        for _ in 0..5 {
            notifier.on_event(&AgentEvent::tool_use("Edit", Some("src/a.rs")), &session);
        }
        notifier.on_event(&AgentEvent::tool_use("MultiEdit", Some("src/b.rs")), &session);
        notifier.on_event(&AgentEvent::tool_use("Read", Some("src/c.rs")), &session);
        assert_eq!(session.edited_file_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_become_the_activity_label() {
        let session = session();
        let mut notifier = ProgressNotifier::new(&session, Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(5)).await;
        let message = notifier
            .on_event(&AgentEvent::notification("Running the test suite"), &session)
            .unwrap();
        assert_eq!(message, "[5s] Running the test suite\nFiles: 0");
    }
}
