mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, sessions::SessionsSubcommand};
use settings::Settings;

#[derive(Parser)]
#[command(
    name = "relay",
    about = "Run a coding agent for issue-tracker agent sessions",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Port to listen on (0 picks a free port)
        #[arg(long, env = "RELAY_PORT", default_value_t = 3000)]
        port: u16,
    },

    /// Inspect and edit stored conversation resumption entries
    Sessions {
        #[command(subcommand)]
        subcommand: SessionsSubcommand,
    },

    /// Check the effective configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = cli.settings.resolve().and_then(|config| match cli.command {
        Commands::Serve { port } => cmd::serve::run(&config, port),
        Commands::Sessions { subcommand } => cmd::sessions::run(&config, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config, subcommand, cli.json),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
