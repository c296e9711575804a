//! Parsing of inbound slash commands.

use crate::chat::format;
use crate::task::{TaskKind, TaskRequest};

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// `/fix`, `/feat` or `/code`.
    Task(TaskRequest),
    Status,
    Cancel { project: String },
    Projects,
    Help,
    /// A known command used wrongly; the text is the reply.
    Usage(String),
}

impl ChatCommand {
    /// Parse a message. Returns `None` for text that is not a known command.
    ///
    /// Accepts the `/cmd@botname` form Telegram uses in group chats.
    pub fn parse(text: &str) -> Option<ChatCommand> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        let command = match name.as_str() {
            "fix" => parse_task(args, TaskKind::Fix),
            "feat" | "feature" => parse_task(args, TaskKind::Feature),
            "code" => parse_task(args, TaskKind::Auto),
            "status" => ChatCommand::Status,
            "cancel" => match args.split_whitespace().next() {
                Some(project) => ChatCommand::Cancel {
                    project: project.to_string(),
                },
                None => ChatCommand::Usage(format::CANCEL_USAGE.to_string()),
            },
            "projects" => ChatCommand::Projects,
            "help" | "start" => ChatCommand::Help,
            _ => return None,
        };
        Some(command)
    }
}

/// `<project> <issue#>` (for `/fix` only) or `<project> <prompt...>`.
fn parse_task(args: &str, kind: TaskKind) -> ChatCommand {
    let words: Vec<&str> = args.split_whitespace().collect();
    let Some((project, prompt_words)) = words.split_first() else {
        return ChatCommand::Usage(format::USAGE.to_string());
    };

    if kind == TaskKind::Fix
        && let [single] = prompt_words
        && let Ok(number) = single.parse::<u64>()
    {
        return ChatCommand::Task(TaskRequest::from_issue(*project, number));
    }

    if prompt_words.is_empty() {
        return ChatCommand::Usage(format::MISSING_TASK.to_string());
    }
    ChatCommand::Task(TaskRequest::from_prompt(
        *project,
        kind,
        prompt_words.join(" "),
    ))
}
