use crate::output::print_json;
use clap::Subcommand;
use relay_core::config::{Config, ConfigWarning, WarnLevel};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the effective config and look for the agent executable
    Check,

    /// Print the effective config with secrets redacted
    Show,
}

pub fn run(config: &Config, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Check => check(config, json),
        ConfigSubcommand::Show => show(config, json),
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn check(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut warnings = config.validate();
    if let Some(w) = executable_warning(config) {
        warnings.push(w);
    }

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if Config::has_errors(&warnings) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

/// The agent binary is looked up at run time, so a missing one only warns.
fn executable_warning(config: &Config) -> Option<ConfigWarning> {
    let name = config.agent.executable.as_deref().unwrap_or("claude");
    match which::which(name) {
        Ok(_) => None,
        Err(_) => Some(ConfigWarning {
            level: WarnLevel::Warning,
            message: format!("agent executable '{name}' not found; runs will fail to start"),
        }),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(config: &Config, json: bool) -> anyhow::Result<()> {
    let redact = |v: &Option<String>| match v.as_deref() {
        Some(s) if !s.is_empty() => "<set>",
        _ => "<unset>",
    };
    let state_dir = config.state_dir()?;
    let repos_dir = config.repos_dir()?;

    if json {
        return print_json(&serde_json::json!({
            "webhook_secret": redact(&config.webhook_secret),
            "api_token": redact(&config.api_token),
            "api_url": config.api_url,
            "environment": config.environment,
            "mention_token": config.mention_token,
            "state_dir": state_dir,
            "repos_dir": repos_dir,
            "agent": config.agent,
            "dedup": config.dedup,
            "request_timeout_secs": config.request_timeout_secs,
        }));
    }

    println!("webhook_secret:  {}", redact(&config.webhook_secret));
    println!("api_token:       {}", redact(&config.api_token));
    println!("api_url:         {}", config.api_url);
    println!("environment:     {:?}", config.environment);
    println!("mention_token:   {}", config.mention_token);
    println!("state_dir:       {}", state_dir.display());
    println!("repos_dir:       {}", repos_dir.display());
    println!(
        "agent:           model={} max_turns={}",
        config.agent.model.as_deref().unwrap_or("default"),
        config.agent.max_turns
    );
    println!(
        "dedup:           ttl={}s capacity={}",
        config.dedup.ttl_secs, config.dedup.capacity
    );
    Ok(())
}
