use anyhow::Context;
use relay_core::config::{Config, WarnLevel};
use relay_server::AppState;

pub fn run(config: &Config, port: u16) -> anyhow::Result<()> {
    let warnings = config.validate();
    for w in &warnings {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => tracing::error!("{}", w.message),
        }
    }
    if Config::has_errors(&warnings) {
        anyhow::bail!("refusing to start with an invalid config (see `relay config check`)");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = AppState::from_config(config).context("failed to build controller state")?;
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
            .await
            .with_context(|| format!("failed to bind port {port}"))?;

        tracing::info!(
            environment = ?config.environment,
            state_dir = %config.state_dir()?.display(),
            "controller ready"
        );

        tokio::select! {
            res = relay_server::serve_on(state, listener) => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}
