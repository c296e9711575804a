use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::prompts::SYSTEM_PROMPT_APPEND;
use super::{AgentEvent, AgentOutcome, AgentRequest, CodingAgent};
use crate::stream::{self, ContentBlock, StreamEvent};

/// Cap on captured stderr, enough for a useful error message.
const MAX_STDERR_BYTES: usize = 8 * 1024;
const NOTIFICATION_MAX_LEN: usize = 80;

/// Runs the Claude Code CLI in print mode and translates its stream-json
/// output into [`AgentEvent`]s.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    /// Program followed by any leading arguments, whitespace separated.
    command: String,
}

impl ClaudeCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn build_command(&self, request: &AgentRequest) -> Result<Command> {
        let mut words = self.command.split_whitespace();
        let program = words.next().context("Agent command is empty")?;

        let mut cmd = Command::new(program);
        cmd.args(words)
            .args(["-p", &request.instruction])
            .args(["--output-format", "stream-json", "--verbose"])
            .args(["--permission-mode", &request.permission_mode.to_string()])
            .args(["--max-turns", &request.max_turns.to_string()])
            .args(["--max-budget-usd", &request.max_budget_usd.to_string()])
            .args(["--append-system-prompt", SYSTEM_PROMPT_APPEND])
            .args(["--allowedTools", &request.allowed_tools.join(",")])
            .current_dir(&request.working_dir)
            .env_remove("CLAUDECODE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

/// Translate one content block into the event the orchestrator sees.
fn block_to_event(block: ContentBlock) -> Option<AgentEvent> {
    match block {
        ContentBlock::ToolUse { name, input } => Some(AgentEvent::ToolUse {
            description: stream::describe_tool_use(&name, &input),
            file_path: stream::tool_file_path(&input),
            name,
        }),
        ContentBlock::Text { text } => {
            let message = stream::first_line(&text, NOTIFICATION_MAX_LEN);
            (!message.is_empty()).then(|| AgentEvent::notification(message))
        }
        ContentBlock::Other => None,
    }
}

#[async_trait]
impl CodingAgent for ClaudeCli {
    async fn run(
        &self,
        request: AgentRequest,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<AgentOutcome> {
        let mut child = self
            .build_command(&request)?
            .spawn()
            .context("Failed to spawn claude process")?;
        debug!(dir = %request.working_dir.display(), "claude process started");

        let stdout = child.stdout.take().context("claude stdout was not captured")?;
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut collected = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if collected.len() < MAX_STDERR_BYTES {
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                }
            }
            collected
        });

        let cancel = &request.cancellation;
        let mut lines = BufReader::new(stdout).lines();
        let mut outcome: Option<AgentOutcome> = None;
        let mut stopped = false;

        'read: loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stopped = true;
                    break 'read;
                }
                line = lines.next_line() => line.context("Failed to read claude output")?,
            };
            let Some(line) = line else { break };
            let Some(event) = stream::parse_line(&line) else {
                continue;
            };

            match event {
                StreamEvent::Assistant { message } => {
                    for agent_event in message.content.into_iter().filter_map(block_to_event) {
                        let delivered = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => false,
                            sent = events.send(agent_event) => sent.is_ok(),
                        };
                        if !delivered {
                            stopped = true;
                            break 'read;
                        }
                    }
                }
                StreamEvent::Result {
                    subtype,
                    result,
                    is_error,
                    total_cost_usd,
                    num_turns,
                } => {
                    debug!(subtype = %subtype, is_error, "claude result received");
                    outcome = Some(AgentOutcome {
                        total_cost_usd,
                        num_turns,
                        is_error,
                        result,
                        cancelled: false,
                    });
                }
                StreamEvent::System { subtype } => {
                    debug!(subtype = %subtype, "claude system event");
                }
                StreamEvent::User => {}
            }
        }

        if stopped {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to kill claude process");
            }
            let _ = child.wait().await;
            return Ok(AgentOutcome {
                cancelled: true,
                ..outcome.unwrap_or_default()
            });
        }

        let status = child.wait().await.context("Failed to wait for claude process")?;
        let stderr = stderr_task.await.unwrap_or_default();

        match outcome {
            Some(outcome) => Ok(outcome),
            None if !status.success() => {
                anyhow::bail!("claude exited with {}: {}", status, stderr.trim())
            }
            None => {
                warn!("claude exited without a result record");
                Ok(AgentOutcome::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::PermissionMode;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn write_script(dir: &Path, body: &str) -> ClaudeCli {
        let script = dir.join("fake-claude.sh");
        std::fs::write(&script, body).unwrap();
        ClaudeCli::new(format!("sh {}", script.display()))
    }

    fn request(dir: &TempDir) -> AgentRequest {
        AgentRequest {
            instruction: "Fix issue #42: Null pointer on login".into(),
            working_dir: dir.path().to_path_buf(),
            allowed_tools: crate::agent::DEFAULT_ALLOWED_TOOLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            permission_mode: PermissionMode::BypassPermissions,
            max_turns: 50,
            max_budget_usd: 5.0,
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn streams_tool_use_and_returns_result() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_script(
            dir.path(),
            r#"cat <<'EOF'
{"type":"system","subtype":"init"}
not json at all
{"type":"assistant","message":{"content":[{"type":"text","text":"Looking at login.ts"},{"type":"tool_use","name":"Edit","input":{"file_path":"/repo/src/login.ts"},"id":"1"}]}}
{"type":"user","tool_use_result":{"ok":true}}
{"type":"result","subtype":"success","is_error":false,"result":"done","total_cost_usd":0.25,"num_turns":3}
EOF
"#,
        );

        let (tx, mut rx) = mpsc::channel(16);
        let outcome = agent.run(request(&dir), tx).await.unwrap();

        assert_eq!(outcome.total_cost_usd, Some(0.25));
        assert_eq!(outcome.num_turns, Some(3));
        assert!(!outcome.is_error);
        assert!(!outcome.cancelled);

        assert_eq!(
            rx.recv().await,
            Some(AgentEvent::notification("Looking at login.ts"))
        );
        match rx.recv().await {
            Some(AgentEvent::ToolUse { name, file_path, .. }) => {
                assert_eq!(name, "Edit");
                assert_eq!(file_path.as_deref(), Some("/repo/src/login.ts"));
            }
            other => panic!("expected tool use, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn passes_budgets_and_permission_mode() {
        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("args.txt");
        let agent = write_script(
            dir.path(),
            &format!(
                "for a in \"$@\"; do printf '%s\\n' \"$a\" >> {}; done\n\
                 echo '{{\"type\":\"result\",\"subtype\":\"success\",\"is_error\":false}}'\n",
                args_file.display()
            ),
        );

        let (tx, _rx) = mpsc::channel(16);
        agent.run(request(&dir), tx).await.unwrap();

        let args: Vec<String> = std::fs::read_to_string(&args_file)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        let after = |flag: &str| {
            let idx = args.iter().position(|a| a == flag).unwrap();
            args[idx + 1].clone()
        };
        assert_eq!(after("-p"), "Fix issue #42: Null pointer on login");
        assert_eq!(after("--output-format"), "stream-json");
        assert_eq!(after("--permission-mode"), "bypassPermissions");
        assert_eq!(after("--max-turns"), "50");
        assert_eq!(after("--max-budget-usd"), "5");
        assert_eq!(after("--allowedTools"), "Read,Edit,Write,Glob,Grep,Bash,Task");
    }

    #[tokio::test]
    async fn error_result_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_script(
            dir.path(),
            "echo '{\"type\":\"result\",\"subtype\":\"error_max_turns\",\"is_error\":true,\"total_cost_usd\":4.2}'\nexit 1\n",
        );
        let (tx, _rx) = mpsc::channel(16);
        let outcome = agent.run(request(&dir), tx).await.unwrap();
        assert!(outcome.is_error);
        assert_eq!(outcome.total_cost_usd, Some(4.2));
    }

    #[tokio::test]
    async fn crash_without_result_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_script(dir.path(), "echo 'authentication failed' >&2\nexit 3\n");
        let (tx, _rx) = mpsc::channel(16);
        let err = agent.run(request(&dir), tx).await.unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let agent = ClaudeCli::new("/nonexistent/claude-binary");
        let (tx, _rx) = mpsc::channel(16);
        let err = agent.run(request(&dir), tx).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_script(
            dir.path(),
            r#"echo '{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Write","input":{"file_path":"a.rs"},"id":"1"}]}}'
exec sleep 30
"#,
        );
        let req = request(&dir);
        let token = req.cancellation.clone();
        let (tx, mut rx) = mpsc::channel(1);

        let run = tokio::spawn(async move { agent.run(req, tx).await });
        assert!(matches!(rx.recv().await, Some(AgentEvent::ToolUse { .. })));
        token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("run should stop after cancellation")
            .unwrap()
            .unwrap();
        assert!(outcome.cancelled);
    }
}
