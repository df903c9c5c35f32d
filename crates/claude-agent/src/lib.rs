//! `claude-agent`: native Rust driver for the Claude CLI subprocess.
//!
//! Implements the `--output-format stream-json` protocol so the relay can run
//! the coding agent as an opaque capability: a prompt and options go in, an
//! ordered stream of typed messages comes out, and cancelling the run's
//! [`CancellationToken`] ends the stream with [`ClaudeAgentError::Cancelled`].
//! The CLI is sent SIGTERM and given a grace period to exit on its own before
//! it is killed.
//!
//! # Architecture
//!
//! ```text
//! QueryOptions (cwd, resume, cancel, …)
//!     │
//!     ▼
//! ClaudeProcess   ← spawns `claude --print --output-format stream-json …`
//!     │              reads JSONL from stdout
//!     ▼
//! QueryStream     ← futures::Stream<Item = Result<Message>>
//!     │              background task + mpsc channel, checks the token
//!     ▼
//! Message enum    ← system / assistant / user / result
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use claude_agent::{query, Message, QueryOptions};
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let opts = QueryOptions {
//!     cwd: Some("/srv/repos/api".into()),
//!     cancel: Some(cancel.clone()),
//!     ..Default::default()
//! };
//!
//! let mut stream = query("Fix the failing test.", opts);
//! while let Some(msg) = stream.next().await {
//!     if let Message::Result(r) = msg? {
//!         println!("{}", r.result_text().unwrap_or(""));
//!     }
//! }
//! ```

pub mod error;
pub mod types;

pub(crate) mod process;
pub mod stream;


pub use error::ClaudeAgentError;
pub use stream::QueryStream;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    AssistantMessage, ContentBlock, Message, PermissionMode, QueryOptions, ResultError,
    ResultMessage, ResultSuccess, SystemMessage, SystemPayload, UserMessage,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeAgentError>;

/// Start a single agentic query against the Claude CLI.
///
/// The returned [`QueryStream`] yields messages as they arrive and ends after
/// the first [`Message::Result`], on process exit, or after
/// [`ClaudeAgentError::Cancelled`] once `opts.cancel` fires.
pub fn query(prompt: impl Into<String>, opts: QueryOptions) -> QueryStream {
    QueryStream::new(prompt.into(), opts)
}
