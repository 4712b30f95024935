use anyhow::{Context, Result};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cubepull_core::{ExtractionScheduler, RunOutcome, RunReport, SystemClock};
use cubepull_state::{CheckpointBackend, RunLock};

use crate::config::ProjectConfig;
use crate::sink::CsvFileSink;
use crate::source::CommandSource;

pub type CliScheduler = ExtractionScheduler<CommandSource, CsvFileSink, CheckpointBackend, SystemClock>;

/// Everything a run needs, held together so the lock outlives the scheduler.
pub struct Runner {
    pub scheduler: CliScheduler,
    _lock: RunLock,
}

impl Runner {
    /// Take the run lock and wire the scheduler from config.
    pub fn prepare(config: &ProjectConfig, shutdown: CancellationToken) -> Result<Self> {
        let lock = RunLock::acquire(&config.state.lock_path)
            .context("Failed to acquire run lock")?;

        let scheduler_config = config.scheduler_config()?;
        let source = CommandSource::from_config(config)?;
        let sink = CsvFileSink::from_config(&config.output);
        let store = config.open_store()?;

        Ok(Self {
            scheduler: ExtractionScheduler::new(
                scheduler_config,
                source,
                sink,
                store,
                SystemClock::new(shutdown),
            ),
            _lock: lock,
        })
    }
}

/// Cancel the returned token on Ctrl-C.
///
/// Waits stop at the next opportunity; a query already running is left to finish.
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, stopping after the current step");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    token
}

/// Print the report and exit non-zero if the run halted on a failed date.
pub fn finish(report: RunReport) -> Result<()> {
    println!(
        "\nProcessed {} date(s){}",
        report.processed.len(),
        match (report.processed.first(), report.processed.last()) {
            (Some(first), Some(last)) if first != last => format!(": {} .. {}", first, last),
            (Some(first), _) => format!(": {}", first),
            _ => String::new(),
        }
    );

    match report.outcome {
        RunOutcome::Completed => {
            println!("{}", "Run completed.".green());
            Ok(())
        }
        RunOutcome::Interrupted => {
            println!(
                "{}",
                "Run interrupted. The next run resumes from the checkpoint.".yellow()
            );
            Ok(())
        }
        RunOutcome::Halted {
            date,
            attempts,
            reason,
        } => {
            eprintln!(
                "{}",
                format!(
                    "Run halted: {} failed after {} attempt(s): {}",
                    date, attempts, reason
                )
                .red()
            );
            eprintln!(
                "{}",
                "The date was recorded as missing. Use 'cubepull retry-missing' once the source recovers."
                    .yellow()
            );
            std::process::exit(1);
        }
    }
}
