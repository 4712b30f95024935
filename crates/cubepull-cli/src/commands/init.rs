use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use tracing::info;

use cubepull_core::Checkpoint;

use crate::config::{ProjectConfig, TEMPLATE};

const ENV_EXAMPLE: &str = r#"# cubepull environment variables
# Copy this file to .env and fill in your values

CUBE_SERVER=
CUBE_CATALOG=
CUBE_USER=
CUBE_PASSWORD=
"#;

pub fn cmd_init(config_path: &Path, last_pull: NaiveDate, force: bool) -> Result<()> {
    if !config_path.exists() {
        fs::write(config_path, TEMPLATE)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Created {}", config_path.display());

        let env_example = config_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(".env.example");
        if !env_example.exists() {
            fs::write(&env_example, ENV_EXAMPLE)?;
            println!("Created {}", env_example.display());
        }
    } else {
        println!("{} already exists, skipping", config_path.display());
    }

    let config = ProjectConfig::load(config_path)?;
    let store = config.open_store()?;

    info!(last_pull = %last_pull, force, "Bootstrapping checkpoint");
    store
        .bootstrap(&Checkpoint::new(last_pull), force)
        .context("Failed to bootstrap checkpoint (use --force to replace it)")?;

    println!(
        "\n{}",
        format!("Checkpoint set: last pull {}", last_pull).green().bold()
    );
    println!("\nNext steps:");
    println!("  1. Edit {} for your cube and query program", config_path.display());
    println!("  2. Copy .env.example to .env and fill in your credentials");
    println!("  3. Run: cubepull run\n");

    Ok(())
}
