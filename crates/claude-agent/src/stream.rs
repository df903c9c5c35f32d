use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::process::ClaudeProcess;
use crate::types::{Message, QueryOptions};
use crate::{ClaudeAgentError, Result};

// ─── QueryStream ──────────────────────────────────────────────────────────

/// An async stream of [`Message`]s from a Claude subprocess.
///
/// A background task owns the [`ClaudeProcess`] and forwards messages over an
/// mpsc channel until the terminal `Result`, process exit, or cancellation.
/// The cancellation token from [`QueryOptions::cancel`] is raced against every
/// read, so a stalled process is interrupted too. Once it fires the task sends
/// [`ClaudeAgentError::Cancelled`] and asks the CLI to stop with SIGTERM. The
/// CLI gets [`CANCEL_GRACE`] to wind down on its own and is only killed if it
/// is still running after that. Dropping the stream stops the task on its next
/// send.
pub struct QueryStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl QueryStream {
    pub(crate) fn new(prompt: String, mut opts: QueryOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let cancel = opts.cancel.take().unwrap_or_default();

        tokio::spawn(async move {
            if cancel.is_cancelled() {
                let _ = tx.send(Err(ClaudeAgentError::Cancelled)).await;
                return;
            }

            let mut process = match ClaudeProcess::spawn(&prompt, &opts).await {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let outcome = pump(&mut process, &tx, &cancel).await;

            if outcome == Pump::Eof {
                if let Some(exit_err) = process.wait_exit_error().await {
                    let _ = tx.send(Err(exit_err)).await;
                }
            }

            shut_down(&mut process, &outcome).await;
        });

        QueryStream { rx }
    }

    /// Wrap a raw receiver, for callers that fabricate message sequences.
    pub fn from_channel(rx: mpsc::Receiver<Result<Message>>) -> Self {
        Self { rx }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Pump {
    /// Terminal result forwarded.
    Finished,
    /// Stdout closed before a result.
    Eof,
    /// Cancellation token fired.
    Cancelled,
    /// Read error or receiver dropped.
    Stopped,
}

/// How long a cancelled CLI may take to exit after SIGTERM.
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

async fn shut_down(process: &mut ClaudeProcess, outcome: &Pump) {
    match outcome {
        Pump::Cancelled => process.terminate(CANCEL_GRACE).await,
        _ => process.kill().await,
    }
}

async fn pump(
    process: &mut ClaudeProcess,
    tx: &mpsc::Sender<Result<Message>>,
    cancel: &CancellationToken,
) -> Pump {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("query cancelled; stopping claude process");
                let _ = tx.send(Err(ClaudeAgentError::Cancelled)).await;
                return Pump::Cancelled;
            }
            next = process.next_message() => next,
        };

        match next {
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return Pump::Stopped;
            }
            Ok(None) => return Pump::Eof,
            Ok(Some(msg)) => {
                let is_terminal = matches!(msg, Message::Result(_));
                if tx.send(Ok(msg)).await.is_err() {
                    return Pump::Stopped;
                }
                if is_terminal {
                    return Pump::Finished;
                }
            }
        }
    }
}

impl Stream for QueryStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultMessage;
    use futures::StreamExt;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::process::Command;

    /// Run `sh -c script` as the mock claude process and pump it.
    fn mock_stream(script: String, cancel: CancellationToken) -> QueryStream {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            let mut process = ClaudeProcess::spawn_command(cmd).unwrap();
            let outcome = pump(&mut process, &tx, &cancel).await;
            shut_down(&mut process, &outcome).await;
        });

        QueryStream { rx }
    }

    fn cat_lines(lines: &[&str]) -> (String, NamedTempFile) {
        let mut f = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        (format!("cat '{}'", f.path().display()), f)
    }

    const INIT_LINE: &str = r#"{"type":"system","subtype":"init","session_id":"s1","model":"m","tools":[],"cwd":"/tmp"}"#;
    const TEXT_LINE: &str = r#"{"type":"assistant","session_id":"s1","parent_tool_use_id":null,"message":{"id":"m1","role":"assistant","model":"m","content":[{"type":"text","text":"Working on it"}]}}"#;
    const RESULT_LINE: &str = r#"{"type":"result","subtype":"success","session_id":"s1","result":"Hello from mock!","duration_ms":1,"is_error":false,"num_turns":1,"total_cost_usd":0.0}"#;

    #[tokio::test]
    async fn stream_yields_all_messages() {
        let (script, _f) = cat_lines(&[INIT_LINE, TEXT_LINE, RESULT_LINE]);
        let messages: Vec<_> = mock_stream(script, CancellationToken::new()).collect().await;
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.is_ok()));
    }

    #[tokio::test]
    async fn stream_terminates_after_result() {
        let (script, _f) = cat_lines(&[INIT_LINE, RESULT_LINE, INIT_LINE]);
        let messages: Vec<_> = mock_stream(script, CancellationToken::new()).collect().await;
        assert_eq!(messages.len(), 2);
        let last = messages.last().unwrap().as_ref().unwrap();
        assert!(matches!(last, Message::Result(ResultMessage::Success(_))));
    }

    #[tokio::test]
    async fn stream_skips_unmodelled_and_blank_lines() {
        let (script, _f) = cat_lines(&[
            INIT_LINE,
            "",
            r#"{"type":"rate_limit_event","session_id":"s1"}"#,
            RESULT_LINE,
        ]);
        let messages: Vec<_> = mock_stream(script, CancellationToken::new()).collect().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].as_ref().unwrap().session_id(), "s1");
    }

    #[tokio::test]
    async fn cancellation_stops_a_stalled_process() {
        let script = format!("echo '{INIT_LINE}'; sleep 30");
        let cancel = CancellationToken::new();
        let mut stream = mock_stream(script, cancel.clone());

        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, Message::System(_)));

        cancel.cancel();
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
            .await
            .expect("stream must end promptly after cancel");
        assert!(matches!(next, Some(Err(ClaudeAgentError::Cancelled))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_lets_the_process_wind_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("wound-down");
        let script = format!(
            "trap 'echo bye > \"{}\"; exit 0' TERM; echo '{INIT_LINE}'; while :; do sleep 0.1; done",
            marker.display()
        );
        let cancel = CancellationToken::new();
        let mut stream = mock_stream(script, cancel.clone());

        assert!(matches!(stream.next().await, Some(Ok(Message::System(_)))));
        cancel.cancel();
        assert!(matches!(stream.next().await, Some(Err(ClaudeAgentError::Cancelled))));
        assert!(stream.next().await.is_none());

        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "bye\n");
    }

    #[tokio::test]
    async fn pre_cancelled_query_never_spawns() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = QueryOptions {
            path_to_executable: Some("/definitely/not/claude".into()),
            cancel: Some(cancel),
            ..Default::default()
        };
        let messages: Vec<_> = QueryStream::new("hi".into(), opts).collect().await;
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Err(ClaudeAgentError::Cancelled)));
    }
}
