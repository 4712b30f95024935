pub mod backoff;
pub mod checkpoint;
pub mod clock;
pub mod error;
pub mod mock;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod throttle;
pub mod types;
pub mod window;

pub use backoff::{AttemptOutcome, BackoffController, RetryOutcome, RetryPolicy, RetryState};
pub use checkpoint::CheckpointStore;
pub use clock::{Clock, SystemClock};
pub use error::{BoxError, Cancelled, FetchError, SchedulerError, SchedulerResult};
pub use scheduler::{ExtractionScheduler, RunOutcome, RunReport, SchedulerConfig};
pub use sink::ResultSink;
pub use source::QuerySource;
pub use throttle::ThrottlePolicy;
pub use types::{Checkpoint, DateRange, FetchRequest, FetchVariant, Rows, VariantPolicy};
pub use window::TimeWindowGate;
