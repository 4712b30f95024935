use std::future::Future;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

/// Source of wall-clock time and of every wait the scheduler performs.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Whether shutdown has been requested.
    fn is_shutdown(&self) -> bool;

    /// Wait for `duration`, or until shutdown is requested.
    fn sleep(&self, duration: Duration) -> impl Future<Output = Result<(), Cancelled>> + Send;
}

/// Real clock backed by tokio timers, interruptible through a cancellation token.
#[derive(Debug, Clone)]
pub struct SystemClock {
    shutdown: CancellationToken,
}

impl SystemClock {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = Result<(), Cancelled>> + Send {
        let shutdown = self.shutdown.clone();
        async move {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => Err(Cancelled),
                _ = tokio::time::sleep(duration) => Ok(()),
            }
        }
    }
}
