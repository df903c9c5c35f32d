use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_API_URL: &str = "https://api.linear.app/graphql";
pub const DEFAULT_MENTION_TOKEN: &str = "@agent";
const RESUME_FILE: &str = "resume-sessions.json";
const DEBUG_DIR: &str = "webhook-debug";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Deployment flavour. Development additionally captures raw webhook bodies
/// under `<state_dir>/webhook-debug/`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

impl FromStr for Environment {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(RelayError::Config(format!(
                "unknown environment '{other}': expected development or production"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Path to the `claude` executable; looked up on PATH when unset.
    #[serde(default)]
    pub executable: Option<String>,
}

fn default_max_turns() -> u32 {
    200
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_turns: default_max_turns(),
            executable: None,
        }
    }
}

// ---------------------------------------------------------------------------
// DedupConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_capacity() -> usize {
    1000
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Shared secret the tracker signs webhook bodies with.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Bearer token for the tracker's GraphQL API.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Where repositories are checked out; defaults to `<state_dir>/repos`.
    #[serde(default)]
    pub repos_dir: Option<PathBuf>,
    /// Where the resumption file and debug captures live; defaults to `~/.relay`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_mention_token")]
    pub mention_token: String,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_mention_token() -> String {
    DEFAULT_MENTION_TOKEN.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            api_token: None,
            api_url: default_api_url(),
            repos_dir: None,
            state_dir: None,
            environment: Environment::default(),
            mention_token: default_mention_token(),
            agent: AgentConfig::default(),
            dedup: DedupConfig::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("api_token", &redact(&self.api_token))
            .field("api_url", &self.api_url)
            .field("repos_dir", &self.repos_dir)
            .field("state_dir", &self.state_dir)
            .field("environment", &self.environment)
            .field("mention_token", &self.mention_token)
            .field("agent", &self.agent)
            .field("dedup", &self.dedup)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Load a YAML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    /// Resolved state directory: explicit setting, else `~/.relay`.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        home::home_dir()
            .map(|h| h.join(".relay"))
            .ok_or(RelayError::HomeNotFound)
    }

    pub fn repos_dir(&self) -> Result<PathBuf> {
        match &self.repos_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.state_dir()?.join("repos")),
        }
    }

    pub fn resume_path(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join(RESUME_FILE))
    }

    pub fn debug_dir(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join(DEBUG_DIR))
    }

    /// Check the config for problems. `Error` entries mean the server should
    /// not start; `Warning` entries are advisory.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.webhook_secret.as_deref().is_none_or(str::is_empty) {
            push(
                WarnLevel::Error,
                "webhook secret is not set (RELAY_WEBHOOK_SECRET): every delivery would be rejected"
                    .into(),
            );
        }
        if self.api_token.as_deref().is_none_or(str::is_empty) {
            push(
                WarnLevel::Error,
                "tracker API token is not set (RELAY_API_TOKEN): activities cannot be posted"
                    .into(),
            );
        }
        if self.mention_token.trim().is_empty() {
            push(WarnLevel::Error, "mention token must not be empty".into());
        }
        if self.dedup.capacity == 0 {
            push(WarnLevel::Error, "dedup capacity must be at least 1".into());
        }
        if self.dedup.ttl_secs < 60 {
            push(
                WarnLevel::Warning,
                format!(
                    "dedup ttl of {}s is short; webhook redeliveries may start duplicate runs",
                    self.dedup.ttl_secs
                ),
            );
        }
        if self.request_timeout_secs == 0 {
            push(
                WarnLevel::Error,
                "request_timeout_secs must be greater than zero".into(),
            );
        }
        match self.repos_dir() {
            Ok(dir) if !dir.is_dir() => push(
                WarnLevel::Warning,
                format!(
                    "repos dir {} does not exist; runs will be told to clone into it",
                    dir.display()
                ),
            ),
            Ok(_) => {}
            Err(e) => push(WarnLevel::Error, e.to_string()),
        }

        warnings
    }

    pub fn has_errors(warnings: &[ConfigWarning]) -> bool {
        warnings.iter().any(|w| w.level == WarnLevel::Error)
    }
}
