use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ChatSink;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
/// Telegram rejects messages longer than this many characters.
const MAX_MESSAGE_CHARS: usize = 4096;
/// Seconds the server holds a `getUpdates` call open.
pub const LONG_POLL_SECS: u64 = 30;

/// Telegram Bot API client bound to a single authorized chat.
///
/// Messages go out as plain text: branch names and prompts routinely contain
/// characters that Markdown parse mode would reject.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    chat_id: i64,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, chat_id: i64) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            chat_id,
            api_url: TELEGRAM_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn call<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T> {
        let resp: ApiResponse<T> = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call Telegram {}", method))?
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {} response", method))?;

        if !resp.ok {
            anyhow::bail!(
                "Telegram {} failed: {}",
                method,
                resp.description.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        resp.result
            .with_context(|| format!("Telegram {} returned no result", method))
    }

    /// Drop the webhook (if any) and discard updates queued while offline,
    /// so a restart does not replay old commands.
    pub async fn drop_pending_updates(&self) -> Result<()> {
        let _: bool = self
            .call(
                "deleteWebhook",
                &serde_json::json!({ "drop_pending_updates": true }),
                Duration::from_secs(10),
            )
            .await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &body, Duration::from_secs(timeout_secs + 10))
            .await
    }

    /// Text of `update` if it is a message from the authorized chat.
    pub fn authorized_text<'a>(&self, update: &'a Update) -> Option<&'a str> {
        let message = update.message.as_ref()?;
        if message.chat.id != self.chat_id {
            debug!(chat_id = message.chat.id, "ignoring message from unauthorized chat");
            return None;
        }
        message.text.as_deref()
    }
}

fn clamp_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_MESSAGE_CHARS - 3).collect();
        format!("{}...", head)
    }
}

#[async_trait]
impl ChatSink for TelegramClient {
    async fn send_message(&self, text: &str) -> Result<()> {
        let text = clamp_message(text);
        let body = SendMessage {
            chat_id: self.chat_id,
            text: &text,
        };
        let _: serde_json::Value = self
            .call("sendMessage", &body, Duration::from_secs(30))
            .await?;
        Ok(())
    }
}
