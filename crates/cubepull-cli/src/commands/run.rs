use anyhow::{Context, Result};
use tracing::info;

use crate::config::ProjectConfig;
use crate::runner::{self, Runner};

pub async fn cmd_run(config: ProjectConfig) -> Result<()> {
    info!("Starting cubepull extraction");

    let shutdown = runner::shutdown_on_ctrl_c();
    let report = {
        let runner = Runner::prepare(&config, shutdown)?;
        runner
            .scheduler
            .run()
            .await
            .context("Extraction run failed")?
    };

    runner::finish(report)
}
