use crate::agent::{AgentLauncher, ClaudeLauncher};
use crate::cancel::CancellationRegistry;
use crate::emitter::ActivityEmitter;
use crate::runner::SessionRunner;
use crate::tracker::{GraphqlTracker, Tracker};
use crate::workspace::RepoResolver;
use relay_core::config::Config;
use relay_core::guard::LoopGuard;
use relay_core::registry::SessionRegistry;
use relay_core::resume::ResumptionStore;
use relay_core::text::MentionSanitizer;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const ENGAGED_THREAD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Controller state shared by every request handler. Built once at startup;
/// the registries live for the process lifetime and reset on restart.
#[derive(Clone)]
pub struct AppState {
    pub webhook_secret: Arc<str>,
    pub mention_token: Arc<str>,
    pub runner: SessionRunner,
    guard: Arc<Mutex<LoopGuard>>,
    /// Project-update threads the agent has been mentioned in, forgotten
    /// after a day without activity.
    engaged_threads: Arc<Mutex<SessionRegistry>>,
    /// Set in development: raw webhook bodies are copied here.
    pub debug_dir: Option<PathBuf>,
}

impl AppState {
    /// Assemble the controller around the given tracker and agent.
    pub fn new(
        config: &Config,
        tracker: Arc<dyn Tracker>,
        agent: Arc<dyn AgentLauncher>,
    ) -> relay_core::Result<Self> {
        let sanitizer = MentionSanitizer::new(&config.mention_token)?;
        let emitter = ActivityEmitter::new(tracker.clone(), sanitizer);
        let resolver = RepoResolver::new(tracker, config.repos_dir()?);
        let resumption = Arc::new(ResumptionStore::new(config.resume_path()?));
        let runner = SessionRunner::new(
            emitter,
            resolver,
            agent,
            resumption,
            Arc::new(CancellationRegistry::new()),
        );
        let registry = SessionRegistry::new(
            Duration::from_secs(config.dedup.ttl_secs),
            config.dedup.capacity,
        );
        let debug_dir = if config.environment.is_development() {
            Some(config.debug_dir()?)
        } else {
            None
        };

        Ok(Self {
            webhook_secret: config.webhook_secret.as_deref().unwrap_or_default().into(),
            mention_token: config.mention_token.as_str().into(),
            runner,
            guard: Arc::new(Mutex::new(LoopGuard::new(registry))),
            engaged_threads: Arc::new(Mutex::new(SessionRegistry::new(
                ENGAGED_THREAD_TTL,
                config.dedup.capacity,
            ))),
            debug_dir,
        })
    }

    /// Production wiring: GraphQL tracker client and the `claude` CLI.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let tracker = GraphqlTracker::new(
            config.api_url.clone(),
            config.api_token.clone().unwrap_or_default(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let agent = ClaudeLauncher::new(&config.agent);
        Ok(Self::new(config, Arc::new(tracker), Arc::new(agent))?)
    }

    /// The dedup check and record run under this lock with no suspension
    /// point in between.
    pub fn guard(&self) -> MutexGuard<'_, LoopGuard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a thread as one the agent takes part in, or extend its window.
    pub fn engage_thread(&self, thread_id: &str) {
        self.threads().touch(thread_id);
    }

    pub fn is_engaged(&self, thread_id: &str) -> bool {
        self.threads().contains(thread_id)
    }

    fn threads(&self) -> MutexGuard<'_, SessionRegistry> {
        self.engaged_threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
