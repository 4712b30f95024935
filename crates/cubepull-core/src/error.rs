use chrono::NaiveDate;
use thiserror::Error;

/// Boxed error used where the concrete collaborator error is not known to the core.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single fetch attempt, classified at the source boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeouts, refused connections, a busy upstream. Worth another attempt.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// The upstream rejected the query itself. Retrying cannot help.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        FetchError::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        FetchError::Permanent(message.into())
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// A wait was interrupted by shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait cancelled by shutdown")]
pub struct Cancelled;

/// Errors that abort an extraction run.
///
/// Fetch failures are not in here: those end a run with
/// [`RunOutcome::Halted`](crate::RunOutcome::Halted) after the checkpoint
/// has been saved.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to load checkpoint: {0}")]
    CheckpointLoad(BoxError),

    #[error("failed to write results for {date}: {source}")]
    Sink { date: NaiveDate, source: BoxError },

    #[error("failed to save checkpoint after {date}: {source}")]
    CheckpointSave { date: NaiveDate, source: BoxError },
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
