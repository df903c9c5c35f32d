use claude_agent::{CancellationToken, Message, PermissionMode, QueryOptions};
use futures::Stream;
use relay_core::config::AgentConfig;
use std::path::PathBuf;
use std::pin::Pin;

pub type MessageStream = Pin<Box<dyn Stream<Item = claude_agent::Result<Message>> + Send>>;

/// Everything one agent invocation needs.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub cwd: PathBuf,
    /// Agent conversation to continue instead of starting fresh.
    pub resume: Option<String>,
    pub cancel: CancellationToken,
}

/// Starts the coding agent. The returned stream is finite and ends early
/// once `cancel` fires.
pub trait AgentLauncher: Send + Sync {
    fn launch(&self, request: AgentRequest) -> MessageStream;
}

/// Runs the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeLauncher {
    model: Option<String>,
    max_turns: u32,
    executable: Option<String>,
    system_append: String,
}

impl ClaudeLauncher {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_turns: config.max_turns,
            executable: config.executable.clone(),
            system_append: relay_core::prompt::system_append(),
        }
    }

    fn options(&self, request: &AgentRequest) -> QueryOptions {
        QueryOptions {
            model: self.model.clone(),
            max_turns: Some(self.max_turns),
            permission_mode: PermissionMode::AcceptEdits,
            append_system_prompt: Some(self.system_append.clone()),
            resume: request.resume.clone(),
            cwd: Some(request.cwd.clone()),
            path_to_executable: self.executable.clone(),
            cancel: Some(request.cancel.clone()),
            ..Default::default()
        }
    }
}

impl AgentLauncher for ClaudeLauncher {
    fn launch(&self, request: AgentRequest) -> MessageStream {
        let opts = self.options(&request);
        Box::pin(claude_agent::query(request.prompt, opts))
    }
}
