use thiserror::Error;

/// Errors that can occur when parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("long_attempt_threshold must be at least 1, got {0}")]
    InvalidLongAttemptThreshold(u32),

    #[error("gate_poll_interval_secs must be positive")]
    ZeroPollInterval,

    #[error("service window is empty: morning_start_time and evening_end_time are both {0}")]
    EmptyServiceWindow(String),

    #[error("prior_year_date_offset_days must be positive")]
    ZeroPriorYearOffset,

    #[error("prior_year_date_offset_days must be at most {max}, got {value}")]
    PriorYearOffsetTooLarge { value: u64, max: u64 },

    #[error("{field} must be at most {max} seconds, got {value}")]
    WaitTooLong {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
