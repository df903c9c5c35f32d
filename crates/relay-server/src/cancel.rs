use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A stop signal from the user.
    UserRequest,
    /// A newer run for the same session replaced this one.
    Superseded,
}

/// Live handle for one in-flight run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: u64,
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Why the run was cancelled, once it has been.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    fn cancel(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }
}

/// At most one live [`RunHandle`] per session key.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    runs: Mutex<HashMap<String, RunHandle>>,
    next_id: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> std::sync::MutexGuard<'_, HashMap<String, RunHandle>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new run for `key`. A run already registered under the key
    /// is cancelled as superseded.
    pub fn register(&self, key: &str) -> RunHandle {
        let handle = RunHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        };
        if let Some(previous) = self.runs().insert(key.to_string(), handle.clone()) {
            tracing::info!(session_id = %key, run = previous.id, "superseding in-flight run");
            previous.cancel(StopReason::Superseded);
        }
        handle
    }

    /// Cancel and remove the run for `key`. Returns whether one was live.
    pub fn stop(&self, key: &str) -> bool {
        match self.runs().remove(key) {
            Some(handle) => {
                handle.cancel(StopReason::UserRequest);
                true
            }
            None => false,
        }
    }

    /// Remove `handle` when its run ends, unless a newer run has already
    /// replaced it.
    pub fn release(&self, key: &str, handle: &RunHandle) {
        let mut runs = self.runs();
        if runs.get(key).is_some_and(|h| h.id == handle.id) {
            runs.remove(key);
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.runs().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_cancels_and_removes() {
        let reg = CancellationRegistry::new();
        let handle = reg.register("s1");
        assert!(reg.is_active("s1"));

        assert!(reg.stop("s1"));
        assert!(handle.token().is_cancelled());
        assert_eq!(handle.stop_reason(), Some(StopReason::UserRequest));
        assert!(!reg.is_active("s1"));
        assert!(!reg.stop("s1"));
    }

    #[test]
    fn newer_run_supersedes_older() {
        let reg = CancellationRegistry::new();
        let first = reg.register("s1");
        let second = reg.register("s1");

        assert_eq!(first.stop_reason(), Some(StopReason::Superseded));
        assert!(!second.token().is_cancelled());
        assert_eq!(reg.len(), 1);

        // The superseded run ending must not remove the newer handle.
        reg.release("s1", &first);
        assert!(reg.is_active("s1"));
        reg.release("s1", &second);
        assert!(reg.is_empty());
    }

    #[test]
    fn sessions_are_independent() {
        let reg = CancellationRegistry::new();
        let a = reg.register("a");
        let b = reg.register("b");
        reg.stop("a");
        assert!(a.token().is_cancelled());
        assert!(!b.token().is_cancelled());
    }

    #[test]
    fn first_reason_wins() {
        let reg = CancellationRegistry::new();
        let first = reg.register("s1");
        reg.register("s1");
        assert!(reg.stop("s1"));
        assert_eq!(first.stop_reason(), Some(StopReason::Superseded));
    }
}
