use anyhow::{Context, Result};
use tracing::info;

use crate::config::ProjectConfig;
use crate::runner::{self, Runner};

pub async fn cmd_retry_missing(config: ProjectConfig) -> Result<()> {
    info!("Reprocessing missing dates");

    let shutdown = runner::shutdown_on_ctrl_c();
    let report = {
        let runner = Runner::prepare(&config, shutdown)?;
        runner
            .scheduler
            .retry_missing()
            .await
            .context("Reprocessing missing dates failed")?
    };

    runner::finish(report)
}
