use anyhow::Context;
use clap::Args;
use relay_core::config::{Config, Environment};
use std::path::PathBuf;

/// Global settings. Each flag can also come from its `RELAY_*` variable, and
/// anything set here wins over the YAML file named by `--config`.
#[derive(Args, Debug, Default)]
pub struct Settings {
    /// YAML config file
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Secret the tracker signs webhook bodies with
    #[arg(long, global = true, env = "RELAY_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    /// Tracker API token
    #[arg(long, global = true, env = "RELAY_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Tracker GraphQL endpoint
    #[arg(long, global = true, env = "RELAY_API_URL")]
    pub api_url: Option<String>,

    /// Directory holding repository checkouts
    #[arg(long, global = true, env = "RELAY_REPOS_DIR")]
    pub repos_dir: Option<PathBuf>,

    /// Directory for the resumption file and debug captures
    #[arg(long, global = true, env = "RELAY_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// development or production
    #[arg(long = "env", global = true, env = "RELAY_ENV")]
    pub environment: Option<Environment>,

    /// Token that addresses the agent in comments
    #[arg(long, global = true, env = "RELAY_MENTION")]
    pub mention: Option<String>,
}

impl Settings {
    /// Load the config file, if any, and apply overrides on top.
    pub fn resolve(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(v) = &self.webhook_secret {
            config.webhook_secret = Some(v.clone());
        }
        if let Some(v) = &self.api_token {
            config.api_token = Some(v.clone());
        }
        if let Some(v) = &self.api_url {
            config.api_url = v.clone();
        }
        if let Some(v) = &self.repos_dir {
            config.repos_dir = Some(v.clone());
        }
        if let Some(v) = &self.state_dir {
            config.state_dir = Some(v.clone());
        }
        if let Some(v) = self.environment {
            config.environment = v;
        }
        if let Some(v) = &self.mention {
            config.mention_token = v.clone();
        }

        Ok(config)
    }
}
