//! The chat side of relay: outbound sinks, message text, inbound command
//! parsing, the Telegram transport and the command dispatcher.

pub mod commands;
pub mod dispatch;
pub mod format;
pub mod telegram;

use async_trait::async_trait;
use tracing::warn;

pub use commands::ChatCommand;
pub use dispatch::Dispatcher;
pub use telegram::TelegramClient;

/// Somewhere to send human-readable status messages.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_message(&self, text: &str) -> anyhow::Result<()>;
}

/// Send `text`, logging and swallowing any delivery failure. A flaky chat
/// connection must never abort a run.
pub async fn send_best_effort(sink: &dyn ChatSink, text: &str) {
    if let Err(e) = sink.send_message(text).await {
        warn!(error = %format!("{:#}", e), "failed to deliver chat message");
    }
}

/// Prints messages to stdout. Used by `relay run`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl ChatSink for StdoutSink {
    async fn send_message(&self, text: &str) -> anyhow::Result<()> {
        println!("{}", text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ChatSink for FailingSink {
        async fn send_message(&self, _text: &str) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("telegram is down")
        }
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let sink = FailingSink {
            attempts: AtomicUsize::new(0),
        };
        send_best_effort(&sink, "hello").await;
        send_best_effort(&sink, "again").await;
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stdout_sink_never_fails() {
        assert!(StdoutSink.send_message("Done: demo").await.is_ok());
    }
}
