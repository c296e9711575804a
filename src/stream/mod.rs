use serde::Deserialize;
use serde_json::Value;

/// Events from Claude CLI's stream-json output format
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessage },

    /// Tool results echoed back to the model.
    #[serde(rename = "user")]
    User,

    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        num_turns: Option<u32>,
    },

    #[serde(rename = "system")]
    System { subtype: String },
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

/// Parse one stdout line. Lines that are not stream-json events yield `None`.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Tools whose use changes a file on disk.
pub fn is_edit_tool(name: &str) -> bool {
    matches!(name, "Write" | "Edit" | "MultiEdit" | "NotebookEdit")
}

/// The file a tool call targets, if it names one.
pub fn tool_file_path(input: &Value) -> Option<String> {
    input
        .get("file_path")
        .or_else(|| input.get("notebook_path"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Extract a human-readable description from a tool use event
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let path = || {
        tool_file_path(input)
            .map(|p| shorten_path(&p))
            .unwrap_or_else(|| "file".to_string())
    };
    match name {
        "Read" => format!("Reading: {}", path()),
        "Write" => format!("Creating: {}", path()),
        "Edit" | "MultiEdit" | "NotebookEdit" => format!("Editing: {}", path()),
        "Bash" => {
            let cmd = input
                .get("command")
                .and_then(|v| v.as_str())
                .map(|s| truncate_str(s, 40))
                .unwrap_or_else(|| "command".to_string());
            format!("Running: {}", cmd)
        }
        "Glob" => {
            let pattern = input.get("pattern").and_then(|v| v.as_str()).unwrap_or("*");
            format!("Searching: {}", pattern)
        }
        "Grep" => {
            let pattern = input
                .get("pattern")
                .and_then(|v| v.as_str())
                .map(|s| truncate_str(s, 30))
                .unwrap_or_else(|| "pattern".to_string());
            format!("Grep: {}", pattern)
        }
        "Task" => {
            let desc = input
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("subagent");
            format!("Agent: {}", desc)
        }
        _ => name.to_string(),
    }
}

/// Shorten a file path to just the last 2 components
pub fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

/// Truncate a string with ellipsis
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// First line of assistant text, trimmed and truncated
pub fn first_line(text: &str, max_len: usize) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    truncate_str(first_line.trim(), max_len)
}
