//! Activities: typed units of progress posted back to a tracker session.

use crate::text::{first_line, truncate};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Assistant text longer than this is also surfaced as a progress note.
pub const PROGRESS_TEXT_THRESHOLD: usize = 200;
pub const PROGRESS_MAX_CHARS: usize = 400;
pub const TOOL_PARAMETER_MAX_CHARS: usize = 120;

pub const ACKNOWLEDGEMENT: &str = "On it. Reading the context now.";
pub const FALLBACK_RESPONSE: &str = "I finished working on this but had nothing to report.";
pub const STOPPED_RESPONSE: &str = "Stopped by user request.";
pub const SUPERSEDED_RESPONSE: &str = "Superseded by a newer message; continuing there.";
pub const STOP_ACKNOWLEDGEMENT: &str = "Stop requested. Halting the current run.";
pub const NOTHING_TO_STOP: &str = "No active run to stop.";

#[derive(Debug, Clone, PartialEq)]
pub enum Activity {
    Acknowledgement(String),
    Progress(String),
    Action { tool: String, parameter: String },
    Response(String),
    Error(String),
    /// Final-looking response that keeps the session open for a reply.
    Clarification(String),
}

/// Wire shape of an activity as the tracker's `agentActivityCreate` expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActivityContent {
    Thought { body: String },
    Action { action: String, parameter: String },
    Response { body: String },
    Error { body: String },
    Elicitation { body: String },
}

impl Activity {
    pub fn kind(&self) -> &'static str {
        match self {
            Activity::Acknowledgement(_) => "acknowledgement",
            Activity::Progress(_) => "progress",
            Activity::Action { .. } => "action",
            Activity::Response(_) => "response",
            Activity::Error(_) => "error",
            Activity::Clarification(_) => "clarification",
        }
    }

    /// Terminal activities end a session's visible run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Activity::Response(_) | Activity::Error(_) | Activity::Clarification(_)
        )
    }

    /// Progress notes are superseded by whatever comes next.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Activity::Progress(_))
    }

    /// The human-readable text of this activity.
    pub fn body(&self) -> String {
        match self {
            Activity::Acknowledgement(b)
            | Activity::Progress(b)
            | Activity::Response(b)
            | Activity::Error(b)
            | Activity::Clarification(b) => b.clone(),
            Activity::Action { tool, parameter } if parameter.is_empty() => tool.clone(),
            Activity::Action { tool, parameter } => format!("{tool}: {parameter}"),
        }
    }

    /// Apply `f` to every free-text field.
    pub fn map_text(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            Activity::Acknowledgement(b) => Activity::Acknowledgement(f(&b)),
            Activity::Progress(b) => Activity::Progress(f(&b)),
            Activity::Action { tool, parameter } => Activity::Action {
                tool: f(&tool),
                parameter: f(&parameter),
            },
            Activity::Response(b) => Activity::Response(f(&b)),
            Activity::Error(b) => Activity::Error(f(&b)),
            Activity::Clarification(b) => Activity::Clarification(f(&b)),
        }
    }

    pub fn content(&self) -> ActivityContent {
        match self {
            Activity::Acknowledgement(b) | Activity::Progress(b) => {
                ActivityContent::Thought { body: b.clone() }
            }
            Activity::Action { tool, parameter } => ActivityContent::Action {
                action: tool.clone(),
                parameter: parameter.clone(),
            },
            Activity::Response(b) => ActivityContent::Response { body: b.clone() },
            Activity::Error(b) => ActivityContent::Error { body: b.clone() },
            Activity::Clarification(b) => ActivityContent::Elicitation { body: b.clone() },
        }
    }
}

// ---------------------------------------------------------------------------
// Tool descriptions
// ---------------------------------------------------------------------------

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// Short, tool-specific description of a tool call's argument.
pub fn describe_tool_input(tool: &str, input: &Value) -> String {
    let raw = match tool {
        "Read" | "Write" | "Edit" | "MultiEdit" => str_field(input, "file_path").map(str::to_string),
        "NotebookEdit" => str_field(input, "notebook_path").map(str::to_string),
        "Bash" => str_field(input, "command").map(|c| first_line(c, TOOL_PARAMETER_MAX_CHARS)),
        "Grep" | "Glob" => str_field(input, "pattern").map(|p| match str_field(input, "path") {
            Some(path) => format!("{p} in {path}"),
            None => p.to_string(),
        }),
        "WebFetch" => str_field(input, "url").map(str::to_string),
        "WebSearch" => str_field(input, "query").map(str::to_string),
        "Task" => str_field(input, "description").map(str::to_string),
        "TodoWrite" => input
            .get("todos")
            .and_then(Value::as_array)
            .map(|todos| format!("{} items", todos.len())),
        _ => input
            .as_object()
            .and_then(|obj| obj.values().find_map(Value::as_str))
            .map(str::to_string),
    };
    truncate(&raw.unwrap_or_default(), TOOL_PARAMETER_MAX_CHARS)
}

/// File path a tool call touches, if any.
pub fn touched_file(input: &Value) -> Option<&str> {
    ["file_path", "notebook_path", "path"]
        .iter()
        .find_map(|key| str_field(input, key))
}

pub fn tool_result_note(tool: &str, is_error: bool) -> String {
    if is_error {
        format!("{tool} failed")
    } else {
        format!("{tool} finished")
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Statistics accumulated over one run's tool calls.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    steps: usize,
    tools: BTreeSet<String>,
    files: BTreeSet<String>,
    cost_usd: Option<f64>,
}

impl RunSummary {
    pub fn record_tool(&mut self, tool: &str, input: &Value) {
        self.steps += 1;
        self.tools.insert(tool.to_string());
        if let Some(file) = touched_file(input) {
            self.files.insert(file.to_string());
        }
    }

    pub fn set_cost(&mut self, cost_usd: Option<f64>) {
        self.cost_usd = cost_usd;
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// A summary note is only worth posting for multi-step runs.
    pub fn is_reportable(&self) -> bool {
        self.steps > 1
    }

    pub fn render(&self) -> String {
        let tools: Vec<&str> = self.tools.iter().map(String::as_str).collect();
        let mut out = format!(
            "Completed {} steps using {} ({})",
            self.steps,
            plural(tools.len(), "tool"),
            tools.join(", ")
        );
        if !self.files.is_empty() {
            out.push_str(&format!(", touched {}", plural(self.files.len(), "file")));
        }
        if let Some(cost) = self.cost_usd {
            out.push_str(&format!(", cost ${cost:.4}"));
        }
        out.push('.');
        out
    }
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
