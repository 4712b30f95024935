use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod runner;
mod sink;
mod source;

use cli::{Cli, Commands};
use config::ProjectConfig;

const CRATES: [&str; 4] = ["cubepull", "cubepull_core", "cubepull_state", "cubepull_config"];

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init { last_pull, force } => commands::cmd_init(&cli.config, last_pull, force),
        Commands::Run => {
            let config = ProjectConfig::load(&cli.config)?;
            commands::cmd_run(config).await
        }
        Commands::Status => {
            let config = ProjectConfig::load(&cli.config)?;
            commands::cmd_status(config)
        }
        Commands::RetryMissing => {
            let config = ProjectConfig::load(&cli.config)?;
            commands::cmd_retry_missing(config).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    let mut filter = EnvFilter::from_default_env();
    for krate in CRATES {
        if let Ok(directive) = format!("{}={}", krate, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
