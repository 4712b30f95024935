//! In-memory collaborators for exercising the scheduler without an upstream.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::checkpoint::CheckpointStore;
use crate::clock::Clock;
use crate::error::{Cancelled, FetchError};
use crate::sink::ResultSink;
use crate::source::QuerySource;
use crate::types::{Checkpoint, FetchRequest, Rows};

/// A query source that replays scripted outcomes per date.
///
/// Dates without a script succeed with a single-row result.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    state: Arc<Mutex<SourceState>>,
}

#[derive(Default)]
struct SourceState {
    scripts: HashMap<NaiveDate, VecDeque<Result<Rows, FetchError>>>,
    always_failing: HashSet<NaiveDate>,
    requests: Vec<FetchRequest>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for a date, consumed one per attempt.
    pub fn script(&self, date: NaiveDate, outcomes: Vec<Result<Rows, FetchError>>) {
        let mut state = self.state.lock().unwrap();
        state.scripts.entry(date).or_default().extend(outcomes);
    }

    /// Make every attempt for a date fail transiently.
    pub fn fail_always(&self, date: NaiveDate) {
        self.state.lock().unwrap().always_failing.insert(date);
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn attempts_for(&self, date: NaiveDate) -> usize {
        let state = self.state.lock().unwrap();
        state.requests.iter().filter(|r| r.date == date).count()
    }

    /// Distinct dates requested, in first-seen order.
    pub fn dates_requested(&self) -> Vec<NaiveDate> {
        let state = self.state.lock().unwrap();
        let mut dates: Vec<NaiveDate> = Vec::new();
        for request in &state.requests {
            if !dates.contains(&request.date) {
                dates.push(request.date);
            }
        }
        dates
    }
}

impl QuerySource for ScriptedSource {
    fn fetch(&self, request: &FetchRequest) -> impl Future<Output = Result<Rows, FetchError>> + Send {
        let state = self.state.clone();
        let request = request.clone();
        async move {
            let mut state = state.lock().unwrap();
            state.requests.push(request.clone());

            if let Some(outcome) = state
                .scripts
                .get_mut(&request.date)
                .and_then(|queue| queue.pop_front())
            {
                return outcome;
            }

            if state.always_failing.contains(&request.date) {
                return Err(FetchError::transient(format!(
                    "scripted failure for {}",
                    request.date
                )));
            }

            Ok(Rows::new(
                vec!["date".to_string()],
                vec![vec![request.query_date.to_string()]],
            ))
        }
    }
}

#[derive(Debug, Error)]
#[error("mock sink failure: {0}")]
pub struct MockSinkError(pub String);

/// A result sink that records every write.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

#[derive(Default)]
struct SinkState {
    writes: Vec<(NaiveDate, Rows)>,
    fail_with: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink whose writes all fail.
    pub fn failing(error_message: impl Into<String>) -> Self {
        let sink = Self::new();
        sink.state.lock().unwrap().fail_with = Some(error_message.into());
        sink
    }

    pub fn writes(&self) -> Vec<(NaiveDate, Rows)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn dates_written(&self) -> Vec<NaiveDate> {
        let state = self.state.lock().unwrap();
        state.writes.iter().map(|(date, _)| *date).collect()
    }
}

impl ResultSink for MemorySink {
    type Error = MockSinkError;

    fn write(
        &self,
        date: NaiveDate,
        rows: &Rows,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let state = self.state.clone();
        let rows = rows.clone();
        async move {
            let mut state = state.lock().unwrap();
            if let Some(ref error) = state.fail_with {
                return Err(MockSinkError(error.clone()));
            }
            state.writes.push((date, rows));
            Ok(())
        }
    }
}

#[derive(Debug, Error)]
pub enum MockStoreError {
    #[error("no checkpoint has been bootstrapped")]
    NotBootstrapped,

    #[error("mock store failure: {0}")]
    Failed(String),
}

/// A checkpoint store held in memory, keeping a history of every save.
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    current: Option<Checkpoint>,
    history: Vec<Checkpoint>,
    fail_saves: Option<String>,
}

impl MemoryCheckpointStore {
    /// A store with nothing bootstrapped; `load` fails.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().current = Some(checkpoint);
        store
    }

    /// Make every subsequent save fail.
    pub fn fail_saves(&self, error_message: impl Into<String>) {
        self.state.lock().unwrap().fail_saves = Some(error_message.into());
    }

    pub fn current(&self) -> Option<Checkpoint> {
        self.state.lock().unwrap().current.clone()
    }

    /// Every checkpoint saved, in order.
    pub fn history(&self) -> Vec<Checkpoint> {
        self.state.lock().unwrap().history.clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    type Error = MockStoreError;

    fn load(&self) -> Result<Checkpoint, Self::Error> {
        self.state
            .lock()
            .unwrap()
            .current
            .clone()
            .ok_or(MockStoreError::NotBootstrapped)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        if let Some(ref error) = state.fail_saves {
            return Err(MockStoreError::Failed(error.clone()));
        }
        state.current = Some(checkpoint.clone());
        state.history.push(checkpoint.clone());
        Ok(())
    }
}

/// A clock that only moves when something sleeps on it.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

struct ClockState {
    now: NaiveDateTime,
    sleeps: Vec<Duration>,
    cancel_after: Option<usize>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                now,
                sleeps: Vec::new(),
                cancel_after: None,
            })),
        }
    }

    /// Let `sleeps` more sleeps complete, then treat shutdown as requested:
    /// every later sleep reports cancelled.
    pub fn cancel_after(&self, sleeps: usize) {
        let mut state = self.state.lock().unwrap();
        state.cancel_after = Some(state.sleeps.len() + sleeps);
    }

    /// Request shutdown now.
    pub fn request_shutdown(&self) {
        self.cancel_after(0);
    }

    /// Every completed sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().unwrap().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.state.lock().unwrap().sleeps.iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.state.lock().unwrap().now
    }

    fn is_shutdown(&self) -> bool {
        let state = self.state.lock().unwrap();
        state
            .cancel_after
            .is_some_and(|limit| state.sleeps.len() >= limit)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = Result<(), Cancelled>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap();
            if let Some(limit) = state.cancel_after {
                if state.sleeps.len() >= limit {
                    return Err(Cancelled);
                }
            }

            state.sleeps.push(duration);
            if let Ok(delta) = chrono::Duration::from_std(duration) {
                state.now += delta;
            }
            Ok(())
        }
    }
}
