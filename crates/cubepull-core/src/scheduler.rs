//! Date-by-date extraction loop.
//!
//! One date is fully resolved (gate, fetch with retries, write, checkpoint,
//! throttle) before the next one starts. Nothing here runs concurrently: the
//! upstream allows a single active query.

use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::backoff::{BackoffController, RetryOutcome, RetryPolicy};
use crate::checkpoint::CheckpointStore;
use crate::clock::Clock;
use crate::error::{Cancelled, FetchError, SchedulerError, SchedulerResult};
use crate::sink::ResultSink;
use crate::source::QuerySource;
use crate::throttle::ThrottlePolicy;
use crate::types::{Checkpoint, DateRange, FetchRequest, VariantPolicy};
use crate::window::TimeWindowGate;

/// Everything the scheduler is parameterized by.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub retry: RetryPolicy,
    pub throttle: ThrottlePolicy,
    pub gate: TimeWindowGate,
    pub variants: VariantPolicy,
    pub wait_at_run_start: Duration,
    pub gate_poll_interval: Duration,
}

/// How a run ended when no persistence error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every date in the run was written.
    Completed,
    /// A date failed every attempt. It was recorded as missing and nothing
    /// after it was attempted.
    Halted {
        date: NaiveDate,
        attempts: u32,
        reason: FetchError,
    },
    /// Shutdown was requested during a wait.
    Interrupted,
}

/// Summary of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Dates written during this run, in order.
    pub processed: Vec<NaiveDate>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }
}

/// What a successful fetch does to the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Regular forward pull: advance `last_pull`.
    Forward,
    /// Out-of-band pull of a missing date: clear it from `missing_dates`.
    Reprocess,
}

/// Composes the gate, retry controller and collaborators into a run.
pub struct ExtractionScheduler<Q, R, S, C> {
    config: SchedulerConfig,
    backoff: BackoffController,
    source: Q,
    sink: R,
    store: S,
    clock: C,
}

impl<Q, R, S, C> ExtractionScheduler<Q, R, S, C>
where
    Q: QuerySource,
    R: ResultSink,
    S: CheckpointStore,
    C: Clock,
{
    pub fn new(config: SchedulerConfig, source: Q, sink: R, store: S, clock: C) -> Self {
        let backoff = BackoffController::new(config.retry);
        Self {
            config,
            backoff,
            source,
            sink,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Pull every date from `last_pull + 1` through yesterday.
    ///
    /// The range is fixed when the run starts, even if the run outlives the day.
    pub async fn run(&self) -> SchedulerResult<RunReport> {
        let mut checkpoint = self.load_checkpoint()?;
        let today = self.clock.now().date();
        let range = DateRange::pending(&checkpoint, today);

        if range.is_empty() {
            info!(last_pull = %checkpoint.last_pull, "Checkpoint is up to date, nothing to pull");
            return Ok(RunReport {
                processed: Vec::new(),
                outcome: RunOutcome::Completed,
            });
        }

        info!(
            start = %range.start(),
            end = %range.end(),
            dates = range.len(),
            missing = checkpoint.missing_dates.len(),
            "Starting extraction run"
        );

        if self.clock.sleep(self.config.wait_at_run_start).await.is_err() {
            return Ok(interrupted(Vec::new()));
        }

        self.process(range.iter(), &mut checkpoint, Mode::Forward)
            .await
    }

    /// Re-attempt every date recorded in `missing_dates`, oldest first.
    ///
    /// `last_pull` is left alone; a success only removes the date from the
    /// missing set. The first failure halts, as in [`run`](Self::run).
    pub async fn retry_missing(&self) -> SchedulerResult<RunReport> {
        let mut checkpoint = self.load_checkpoint()?;
        let dates: Vec<NaiveDate> = checkpoint.missing_dates.iter().copied().collect();

        if dates.is_empty() {
            info!("No missing dates recorded");
            return Ok(RunReport {
                processed: Vec::new(),
                outcome: RunOutcome::Completed,
            });
        }

        info!(dates = dates.len(), "Reprocessing missing dates");

        if self.clock.sleep(self.config.wait_at_run_start).await.is_err() {
            return Ok(interrupted(Vec::new()));
        }

        self.process(dates, &mut checkpoint, Mode::Reprocess).await
    }

    async fn process(
        &self,
        dates: impl IntoIterator<Item = NaiveDate>,
        checkpoint: &mut Checkpoint,
        mode: Mode,
    ) -> SchedulerResult<RunReport> {
        let mut processed = Vec::new();

        for date in dates {
            if self.wait_for_window().await.is_err() {
                return Ok(interrupted(processed));
            }

            let request = FetchRequest::new(date, &self.config.variants);
            info!(
                date = %date,
                variant = %request.variant,
                query_date = %request.query_date,
                "Starting query"
            );

            let source = &self.source;
            let request_ref = &request;
            let outcome = self
                .backoff
                .run_with_retry(&self.clock, move |attempt| {
                    debug!(date = %request_ref.date, attempt, "Fetching");
                    source.fetch(request_ref)
                })
                .await;

            match outcome {
                RetryOutcome::Success { value: rows, state } => {
                    info!(
                        date = %date,
                        rows = rows.len(),
                        attempts = state.attempts,
                        "Ending query"
                    );

                    self.sink
                        .write(date, &rows)
                        .await
                        .map_err(|e| SchedulerError::Sink {
                            date,
                            source: Box::new(e),
                        })?;

                    match mode {
                        Mode::Forward => checkpoint.record_success(date),
                        Mode::Reprocess => {
                            checkpoint.resolve_missing(date);
                        }
                    }
                    self.save_checkpoint(checkpoint, date)?;
                    processed.push(date);

                    let wait = self.config.throttle.wait_after_success(self.clock.now());
                    debug!(wait_secs = wait.as_secs(), "Throttling before next query");
                    if self.clock.sleep(wait).await.is_err() {
                        return Ok(interrupted(processed));
                    }
                }
                RetryOutcome::Exhausted {
                    last_error: reason,
                    state,
                }
                | RetryOutcome::Aborted {
                    error: reason,
                    state,
                } => {
                    checkpoint.record_missing(date);
                    self.save_checkpoint(checkpoint, date)?;

                    error!(
                        date = %date,
                        attempts = state.attempts,
                        error = %reason,
                        "Query failed, recorded as missing; halting run"
                    );

                    return Ok(RunReport {
                        processed,
                        outcome: RunOutcome::Halted {
                            date,
                            attempts: state.attempts,
                            reason,
                        },
                    });
                }
                RetryOutcome::Cancelled { state } => {
                    warn!(
                        date = %date,
                        attempts = state.attempts,
                        "Shutdown during retry wait, date left for the next run"
                    );
                    return Ok(interrupted(processed));
                }
            }
        }

        info!(dates = processed.len(), "Extraction run complete");
        Ok(RunReport {
            processed,
            outcome: RunOutcome::Completed,
        })
    }

    /// Block until the service window is open, re-reading the clock on every poll.
    async fn wait_for_window(&self) -> Result<(), Cancelled> {
        let mut announced = false;

        loop {
            let now = self.clock.now();
            if self.config.gate.is_open(now.time()) {
                return Ok(());
            }

            if !announced {
                warn!(
                    now = %now.time(),
                    opens_at = %self.config.gate.start(),
                    "Outside service window, waiting"
                );
                announced = true;
            } else {
                debug!(now = %now.time(), "Service window still closed");
            }

            self.clock.sleep(self.config.gate_poll_interval).await?;
        }
    }

    fn load_checkpoint(&self) -> SchedulerResult<Checkpoint> {
        let checkpoint = self
            .store
            .load()
            .map_err(|e| SchedulerError::CheckpointLoad(Box::new(e)))?;

        debug!(
            last_pull = %checkpoint.last_pull,
            missing = checkpoint.missing_dates.len(),
            "Loaded checkpoint"
        );
        Ok(checkpoint)
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint, date: NaiveDate) -> SchedulerResult<()> {
        self.store
            .save(checkpoint)
            .map_err(|e| SchedulerError::CheckpointSave {
                date,
                source: Box::new(e),
            })
    }
}

fn interrupted(processed: Vec<NaiveDate>) -> RunReport {
    info!(dates = processed.len(), "Run interrupted by shutdown");
    RunReport {
        processed,
        outcome: RunOutcome::Interrupted,
    }
}
