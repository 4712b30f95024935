mod error;
mod schedule;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use schedule::ScheduleConfig;
pub use validation::{to_scheduler_config, validate_schedule};
