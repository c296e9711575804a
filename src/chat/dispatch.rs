use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::commands::ChatCommand;
use super::telegram::{LONG_POLL_SECS, TelegramClient};
use super::{ChatSink, format, send_best_effort};
use crate::workflow::Orchestrator;

/// Pause after a failed `getUpdates` before polling again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Routes chat commands to the orchestrator and replies on the same sink.
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    sink: Arc<dyn ChatSink>,
    runs: TaskTracker,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>, sink: Arc<dyn ChatSink>) -> Self {
        Self {
            orchestrator,
            sink,
            runs: TaskTracker::new(),
        }
    }

    /// Handle one inbound message. Task commands are admitted here, so a
    /// busy project is reported before this returns; the run itself goes to
    /// a spawned task whose handle is returned.
    pub async fn handle(&self, text: &str) -> Option<JoinHandle<()>> {
        let command = ChatCommand::parse(text)?;
        let registry = self.orchestrator.registry();

        let reply = match command {
            ChatCommand::Task(request) => match self.orchestrator.admit(request) {
                Ok(task) => {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    let sink = Arc::clone(&self.sink);
                    return Some(self.runs.spawn(async move {
                        // Failures were already reported to chat by drive().
                        let _ = orchestrator.drive(task, sink.as_ref()).await;
                    }));
                }
                Err(e) => format::error(e),
            },
            ChatCommand::Status => format::status(&registry.list_active()),
            ChatCommand::Cancel { project } => {
                if registry.cancel(&project) {
                    format::cancelled(&project)
                } else {
                    format::no_session(&project)
                }
            }
            ChatCommand::Projects => format::project_list(&self.orchestrator.project_names()),
            ChatCommand::Help => format::help(),
            ChatCommand::Usage(text) => text,
        };

        send_best_effort(self.sink.as_ref(), &reply).await;
        None
    }

    /// Long-poll Telegram until `shutdown` fires, dispatching every message
    /// from the authorized chat.
    pub async fn run_polling(&self, telegram: &TelegramClient, shutdown: CancellationToken) {
        if let Err(e) = telegram.drop_pending_updates().await {
            warn!(error = %format!("{:#}", e), "could not drop pending updates");
        }
        info!(
            chat_id = telegram.chat_id(),
            projects = %self.orchestrator.project_names().join(", "),
            "bot started"
        );

        let mut offset = 0;
        loop {
            let updates = tokio::select! {
                _ = shutdown.cancelled() => break,
                updates = telegram.get_updates(offset, LONG_POLL_SECS) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(text) = telegram.authorized_text(&update) {
                            self.handle(text).await;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "getUpdates failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }

        let active = self.orchestrator.registry().len();
        info!(active_sessions = active, "bot stopped");
    }

    /// Cancel every active run and wait up to `grace` for them to commit
    /// their partial work. Returns false if some runs were still going.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let registry = self.orchestrator.registry();
        for session in registry.list_active() {
            registry.cancel(&session.project);
        }
        self.runs.close();
        let finished = tokio::time::timeout(grace, self.runs.wait()).await.is_ok();
        if !finished {
            warn!(remaining = self.runs.len(), "runs still active at exit");
        }
        finished
    }
}
