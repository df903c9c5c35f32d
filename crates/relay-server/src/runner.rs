//! Session runner: one execution of the coding agent for one session.
//!
//! `Starting -> Streaming -> {Finalizing, Cancelled, Failed}`. Every path ends
//! by releasing the run's cancellation handle, and nothing escapes
//! [`SessionRunner::run`]: failures become an error activity.

use crate::agent::{AgentLauncher, AgentRequest};
use crate::cancel::{CancellationRegistry, RunHandle, StopReason};
use crate::emitter::{ActivityEmitter, RunTarget};
use crate::workspace::RepoResolver;
use claude_agent::{ClaudeAgentError, ContentBlock, Message, ResultMessage};
use futures::StreamExt;
use relay_core::activity::{
    self, Activity, RunSummary, ACKNOWLEDGEMENT, FALLBACK_RESPONSE, PROGRESS_MAX_CHARS,
    PROGRESS_TEXT_THRESHOLD, STOPPED_RESPONSE, SUPERSEDED_RESPONSE,
};
use relay_core::prompt;
use relay_core::resume::ResumptionStore;
use relay_core::text::{sanitize_error, split_clarification, truncate};
use relay_core::webhook::{AgentSession, ThreadEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// What a run was started for.
#[derive(Debug, Clone)]
pub enum RunRequest {
    /// First run of a new session.
    Created(AgentSession),
    /// A follow-up message in an existing session.
    FollowUp(AgentSession),
    /// A mention or reply on a project-update thread.
    Thread(ThreadEvent),
}

impl RunRequest {
    pub fn target(&self) -> RunTarget {
        match self {
            RunRequest::Created(s) | RunRequest::FollowUp(s) => RunTarget::Session(s.id.clone()),
            RunRequest::Thread(t) => RunTarget::Thread {
                project_update_id: t.project_update_id.clone(),
                parent_id: t.thread_id.clone(),
            },
        }
    }

    /// Session whose resumption entry this run reads and writes.
    fn session_id(&self) -> Option<&str> {
        match self {
            RunRequest::Created(s) | RunRequest::FollowUp(s) => Some(&s.id),
            RunRequest::Thread(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    /// Ended with an elicitation; the session stays open.
    AwaitingReply,
    Cancelled(StopReason),
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("agent failed: {0}")]
    Agent(#[from] ClaudeAgentError),

    #[error("agent stopped with {subtype}{detail}")]
    AgentResult {
        subtype: &'static str,
        detail: String,
    },

    #[error("agent exited without a result")]
    NoResult,
}

/// How the streaming phase ended without error.
enum Streamed {
    /// Terminal result seen; carries the final candidate text.
    Finished(Option<String>),
    Cancelled,
}

#[derive(Clone)]
pub struct SessionRunner {
    emitter: ActivityEmitter,
    resolver: RepoResolver,
    agent: Arc<dyn AgentLauncher>,
    resumption: Arc<ResumptionStore>,
    cancellations: Arc<CancellationRegistry>,
}

impl SessionRunner {
    pub fn new(
        emitter: ActivityEmitter,
        resolver: RepoResolver,
        agent: Arc<dyn AgentLauncher>,
        resumption: Arc<ResumptionStore>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            emitter,
            resolver,
            agent,
            resumption,
            cancellations,
        }
    }

    pub fn emitter(&self) -> &ActivityEmitter {
        &self.emitter
    }

    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    /// Register a handle for `request` and run it in the background.
    ///
    /// Registration happens before this returns, so a stop signal that
    /// arrives right after the webhook response finds the run.
    pub fn spawn(&self, request: RunRequest) -> tokio::task::JoinHandle<RunOutcome> {
        let handle = self.cancellations.register(&request.target().key());
        let span = tracing::info_span!("run", key = %request.target().key(), run = handle.id());
        let runner = self.clone();
        tokio::spawn(async move { runner.run(request, handle).await }.instrument(span))
    }

    /// Drive one run to a terminal state and release its handle.
    pub async fn run(&self, request: RunRequest, handle: RunHandle) -> RunOutcome {
        let target = request.target();
        let outcome = match self.stream(&request, &target, &handle).await {
            Ok(Streamed::Finished(text)) => self.finalize(&target, text).await,
            Ok(Streamed::Cancelled) | Err(RunError::Agent(ClaudeAgentError::Cancelled)) => {
                self.cancelled(&target, &handle).await
            }
            Err(e) => self.fail(&request, &target, e).await,
        };
        self.cancellations.release(&target.key(), &handle);
        tracing::info!(outcome = ?outcome, "run finished");
        outcome
    }

    async fn stream(
        &self,
        request: &RunRequest,
        target: &RunTarget,
        handle: &RunHandle,
    ) -> Result<Streamed, RunError> {
        // Starting: acknowledge before any slow I/O.
        self.emitter
            .emit(target, Activity::Acknowledgement(ACKNOWLEDGEMENT.into()))
            .await;

        let prior = request.session_id().and_then(|id| self.resumption.get(id));
        let (prompt, resume, cwd) = match request {
            RunRequest::FollowUp(session) if prior.is_some() => {
                let workspace = self.resolver.resolve(&session.subject).await;
                (prompt::follow_up(&session.message), prior, workspace.dir)
            }
            RunRequest::Created(session) | RunRequest::FollowUp(session) => {
                let workspace = self.resolver.resolve(&session.subject).await;
                (prompt::compose(session, &workspace), None, workspace.dir)
            }
            RunRequest::Thread(thread) => {
                let workspace = self.resolver.default_workspace();
                (prompt::thread(thread), None, workspace.dir)
            }
        };
        tracing::info!(resuming = resume.is_some(), cwd = %cwd.display(), "starting agent");

        // Streaming
        let token = handle.token();
        let mut messages = self.agent.launch(AgentRequest {
            prompt,
            cwd,
            resume,
            cancel: token.clone(),
        });
        let mut progress = Progress::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Streamed::Cancelled),
                next = messages.next() => next,
            };
            let Some(message) = next else {
                return if token.is_cancelled() {
                    Ok(Streamed::Cancelled)
                } else {
                    Err(RunError::NoResult)
                };
            };

            match message? {
                Message::Result(result) => return self.on_result(target, progress, &result).await,
                message => self.on_message(request, target, &mut progress, message).await,
            }
        }
    }

    async fn on_message(
        &self,
        request: &RunRequest,
        target: &RunTarget,
        progress: &mut Progress,
        message: Message,
    ) {
        if !progress.conversation_recorded && !message.session_id().is_empty() {
            progress.conversation_recorded = true;
            if let Some(session_id) = request.session_id() {
                if let Err(e) = self.resumption.set(session_id, message.session_id()) {
                    tracing::warn!(session_id, error = %e, "could not persist resumption entry");
                }
            }
        }

        match message {
            Message::Assistant(assistant) => {
                if let Some(text) = assistant.text() {
                    if text.chars().count() > PROGRESS_TEXT_THRESHOLD {
                        self.emitter
                            .emit(target, Activity::Progress(truncate(&text, PROGRESS_MAX_CHARS)))
                            .await;
                    }
                    progress.latest_text = Some(text);
                }
                for block in &assistant.message.content {
                    if let ContentBlock::ToolUse { id, name, input } = block {
                        progress.summary.record_tool(name, input);
                        progress.pending_tools.insert(id.clone(), name.clone());
                        let activity = Activity::Action {
                            tool: name.clone(),
                            parameter: activity::describe_tool_input(name, input),
                        };
                        self.emitter.emit(target, activity).await;
                    }
                }
            }
            Message::User(user) => {
                for (tool_use_id, is_error) in user.tool_results() {
                    let tool = progress
                        .pending_tools
                        .remove(tool_use_id)
                        .unwrap_or_else(|| "Tool".to_string());
                    let note = activity::tool_result_note(&tool, is_error);
                    self.emitter.emit(target, Activity::Progress(note)).await;
                }
            }
            Message::System(_) | Message::Result(_) => {}
        }
    }

    async fn on_result(
        &self,
        target: &RunTarget,
        mut progress: Progress,
        result: &ResultMessage,
    ) -> Result<Streamed, RunError> {
        if result.is_error() {
            let errors = result.errors();
            let detail = if errors.is_empty() {
                String::new()
            } else {
                format!(": {}", errors.join("; "))
            };
            return Err(RunError::AgentResult {
                subtype: result.subtype(),
                detail,
            });
        }

        progress.summary.set_cost(result.total_cost_usd());
        tracing::info!(
            steps = progress.summary.steps(),
            turns = result.num_turns(),
            cost_usd = ?result.total_cost_usd(),
            "agent finished"
        );
        if progress.summary.is_reportable() {
            self.emitter
                .emit(target, Activity::Progress(progress.summary.render()))
                .await;
        }

        let text = progress.latest_text.or_else(|| {
            result
                .result_text()
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string)
        });
        Ok(Streamed::Finished(text))
    }

    async fn finalize(&self, target: &RunTarget, text: Option<String>) -> RunOutcome {
        let Some(text) = text else {
            self.emitter
                .emit(target, Activity::Response(FALLBACK_RESPONSE.into()))
                .await;
            return RunOutcome::Completed;
        };
        match split_clarification(&text) {
            Some(question) => {
                self.emitter
                    .emit(target, Activity::Clarification(question))
                    .await;
                RunOutcome::AwaitingReply
            }
            None => {
                self.emitter.emit(target, Activity::Response(text)).await;
                RunOutcome::Completed
            }
        }
    }

    /// A cancelled run still closes its own part of the conversation.
    async fn cancelled(&self, target: &RunTarget, handle: &RunHandle) -> RunOutcome {
        let reason = handle.stop_reason().unwrap_or(StopReason::UserRequest);
        let body = match reason {
            StopReason::UserRequest => STOPPED_RESPONSE,
            StopReason::Superseded => SUPERSEDED_RESPONSE,
        };
        self.emitter
            .emit(target, Activity::Response(body.into()))
            .await;
        RunOutcome::Cancelled(reason)
    }

    async fn fail(&self, request: &RunRequest, target: &RunTarget, error: RunError) -> RunOutcome {
        let message = sanitize_error(&error.to_string());
        tracing::error!(error = %message, "run failed");

        if let Some(session_id) = request.session_id() {
            match self.resumption.delete(session_id) {
                Ok(true) => tracing::info!(session_id, "evicted resumption entry after failure"),
                Ok(false) => {}
                Err(e) => tracing::warn!(session_id, error = %e, "could not evict resumption entry"),
            }
        }

        self.emitter
            .emit(target, Activity::Error(format!("The run failed: {message}")))
            .await;
        RunOutcome::Failed(message)
    }
}

/// Per-run streaming state.
#[derive(Default)]
struct Progress {
    conversation_recorded: bool,
    latest_text: Option<String>,
    summary: RunSummary,
    /// tool_use id -> tool name, until its result arrives.
    pending_tools: HashMap<String, String>,
}
