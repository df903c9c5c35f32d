use crate::tracker::{CommentTarget, Tracker};
use relay_core::activity::Activity;
use relay_core::text::{truncate, MentionSanitizer, MAX_BODY_CHARS};
use std::sync::Arc;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Where a run reports to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// A tracker agent session; every activity is posted.
    Session(String),
    /// A project-update thread. Only terminal output becomes a comment reply;
    /// intermediate activities are logged.
    Thread {
        project_update_id: String,
        parent_id: String,
    },
}

impl RunTarget {
    /// Key under which runs for this target are registered.
    pub fn key(&self) -> String {
        match self {
            RunTarget::Session(id) => id.clone(),
            RunTarget::Thread { parent_id, .. } => format!("thread:{parent_id}"),
        }
    }
}

/// Posts activities to the tracker. Bodies are sanitized and length-capped;
/// terminal activities get one retry.
#[derive(Clone)]
pub struct ActivityEmitter {
    tracker: Arc<dyn Tracker>,
    sanitizer: MentionSanitizer,
}

impl ActivityEmitter {
    pub fn new(tracker: Arc<dyn Tracker>, sanitizer: MentionSanitizer) -> Self {
        Self { tracker, sanitizer }
    }

    /// Post `activity`. Returns whether the tracker accepted it. Failures are
    /// logged, never propagated.
    pub async fn emit(&self, target: &RunTarget, activity: Activity) -> bool {
        let activity =
            activity.map_text(|t| truncate(&self.sanitizer.sanitize(t), MAX_BODY_CHARS));
        let attempts = if activity.is_terminal() { 2 } else { 1 };

        for attempt in 1..=attempts {
            let result = match target {
                RunTarget::Session(session_id) => {
                    self.tracker
                        .create_activity(session_id, &activity.content(), activity.is_ephemeral())
                        .await
                }
                RunTarget::Thread {
                    project_update_id,
                    parent_id,
                } => {
                    if !activity.is_terminal() {
                        tracing::debug!(
                            thread = %parent_id,
                            kind = activity.kind(),
                            body = %activity.body(),
                            "thread activity"
                        );
                        return true;
                    }
                    let comment = CommentTarget::Thread {
                        project_update_id: project_update_id.clone(),
                        parent_id: parent_id.clone(),
                    };
                    self.tracker
                        .create_comment(&comment, &activity.body())
                        .await
                }
            };

            match result {
                Ok(()) => return true,
                Err(e) if attempt < attempts => {
                    tracing::warn!(run = %target.key(), kind = activity.kind(), error = %e, "activity delivery failed; retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    if activity.is_terminal() {
                        tracing::error!(run = %target.key(), kind = activity.kind(), error = %e, "terminal activity lost; session left without a final state");
                    } else {
                        tracing::warn!(run = %target.key(), kind = activity.kind(), error = %e, "activity delivery failed");
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerError;
    use async_trait::async_trait;
    use relay_core::activity::ActivityContent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` calls, then records bodies.
    #[derive(Default)]
    struct FlakyTracker {
        failures: usize,
        calls: AtomicUsize,
        posted: Mutex<Vec<String>>,
    }

    impl FlakyTracker {
        fn attempt(&self, body: String) -> Result<(), TrackerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(TrackerError::Graphql("boom".into()));
            }
            self.posted.lock().unwrap().push(body);
            Ok(())
        }
    }

    #[async_trait]
    impl Tracker for FlakyTracker {
        async fn create_activity(
            &self,
            _session_id: &str,
            content: &ActivityContent,
            _ephemeral: bool,
        ) -> Result<(), TrackerError> {
            self.attempt(serde_json::to_string(content).unwrap())
        }

        async fn create_comment(
            &self,
            _target: &CommentTarget,
            body: &str,
        ) -> Result<(), TrackerError> {
            self.attempt(body.to_string())
        }

        async fn issue_repository_urls(&self, _issue_id: &str) -> Result<Vec<String>, TrackerError> {
            Ok(Vec::new())
        }
    }

    fn emitter(tracker: Arc<FlakyTracker>) -> ActivityEmitter {
        ActivityEmitter::new(tracker, MentionSanitizer::new("@agent").unwrap())
    }

    fn session() -> RunTarget {
        RunTarget::Session("sess-1".into())
    }

    #[tokio::test]
    async fn terminal_activity_is_retried_once() {
        let tracker = Arc::new(FlakyTracker {
            failures: 1,
            ..Default::default()
        });
        assert!(
            emitter(tracker.clone())
                .emit(&session(), Activity::Response("done".into()))
                .await
        );
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn terminal_activity_gives_up_after_two_attempts() {
        let tracker = Arc::new(FlakyTracker {
            failures: 5,
            ..Default::default()
        });
        assert!(
            !emitter(tracker.clone())
                .emit(&session(), Activity::Error("bad".into()))
                .await
        );
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn progress_is_not_retried() {
        let tracker = Arc::new(FlakyTracker {
            failures: 1,
            ..Default::default()
        });
        assert!(
            !emitter(tracker.clone())
                .emit(&session(), Activity::Progress("working".into()))
                .await
        );
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outbound_bodies_lose_their_mentions() {
        let tracker = Arc::new(FlakyTracker::default());
        emitter(tracker.clone())
            .emit(&session(), Activity::Response("@Agent fix the bug: done".into()))
            .await;
        let posted = tracker.posted.lock().unwrap();
        assert!(!posted[0].contains('@'));
        assert!(posted[0].contains("Agent fix the bug"));
    }

    #[tokio::test]
    async fn thread_targets_only_post_terminal_output() {
        let tracker = Arc::new(FlakyTracker::default());
        let target = RunTarget::Thread {
            project_update_id: "pu-1".into(),
            parent_id: "c-1".into(),
        };
        let e = emitter(tracker.clone());
        assert!(e.emit(&target, Activity::Progress("thinking".into())).await);
        assert!(e.emit(&target, Activity::Response("summary".into())).await);
        assert_eq!(*tracker.posted.lock().unwrap(), vec!["summary".to_string()]);
        assert_eq!(target.key(), "thread:c-1");
    }
}
