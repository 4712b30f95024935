use std::time::Duration;

use chrono::Days;
use cubepull_core::{RetryPolicy, SchedulerConfig, ThrottlePolicy, TimeWindowGate, VariantPolicy};

use crate::error::{ConfigError, ConfigResult};
use crate::schedule::ScheduleConfig;

/// Longest single wait any schedule setting may ask for (one week).
pub const MAX_WAIT_SECS: u64 = 7 * 24 * 60 * 60;

/// Largest prior-year shift accepted, about ten years.
pub const MAX_PRIOR_YEAR_OFFSET_DAYS: u64 = 3660;

/// Validate a schedule configuration.
pub fn validate_schedule(config: &ScheduleConfig) -> ConfigResult<()> {
    validate_attempts(config)?;
    validate_waits(config)?;
    validate_window(config)?;
    validate_variants(config)?;
    Ok(())
}

fn validate_attempts(config: &ScheduleConfig) -> ConfigResult<()> {
    if config.max_attempts == 0 {
        return Err(ConfigError::InvalidMaxAttempts(config.max_attempts));
    }
    if config.long_attempt_threshold == 0 {
        return Err(ConfigError::InvalidLongAttemptThreshold(
            config.long_attempt_threshold,
        ));
    }
    Ok(())
}

fn validate_waits(config: &ScheduleConfig) -> ConfigResult<()> {
    let waits = [
        ("wait_between_attempts_secs", config.wait_between_attempts_secs),
        ("extra_wait_for_long_attempt_secs", config.extra_wait_for_long_attempt_secs),
        ("wait_at_run_start_secs", config.wait_at_run_start_secs),
        ("wait_between_queries_secs", config.wait_between_queries_secs),
        ("extra_wait_during_daytime_secs", config.extra_wait_during_daytime_secs),
        ("extra_wait_during_business_day_secs", config.extra_wait_during_business_day_secs),
        ("gate_poll_interval_secs", config.gate_poll_interval_secs),
    ];

    for (field, value) in waits {
        if value > MAX_WAIT_SECS {
            return Err(ConfigError::WaitTooLong {
                field,
                value,
                max: MAX_WAIT_SECS,
            });
        }
    }
    Ok(())
}

fn validate_window(config: &ScheduleConfig) -> ConfigResult<()> {
    if config.morning_start_time == config.evening_end_time {
        return Err(ConfigError::EmptyServiceWindow(
            config.morning_start_time.to_string(),
        ));
    }
    if config.gate_poll_interval_secs == 0 {
        return Err(ConfigError::ZeroPollInterval);
    }
    Ok(())
}

fn validate_variants(config: &ScheduleConfig) -> ConfigResult<()> {
    if config.prior_year_date_offset_days == 0 {
        return Err(ConfigError::ZeroPriorYearOffset);
    }
    if config.prior_year_date_offset_days > MAX_PRIOR_YEAR_OFFSET_DAYS {
        return Err(ConfigError::PriorYearOffsetTooLarge {
            value: config.prior_year_date_offset_days,
            max: MAX_PRIOR_YEAR_OFFSET_DAYS,
        });
    }
    Ok(())
}

/// Convert a validated schedule to the core scheduler configuration.
pub fn to_scheduler_config(config: &ScheduleConfig) -> ConfigResult<SchedulerConfig> {
    validate_schedule(config)?;

    Ok(SchedulerConfig {
        retry: RetryPolicy {
            max_attempts: config.max_attempts,
            long_attempt_threshold: config.long_attempt_threshold,
            base_wait: secs(config.wait_between_attempts_secs),
            extra_wait_for_long_attempt: secs(config.extra_wait_for_long_attempt_secs),
        },
        throttle: ThrottlePolicy {
            base_wait: secs(config.wait_between_queries_secs),
            daytime_extra: secs(config.extra_wait_during_daytime_secs),
            business_day_extra: secs(config.extra_wait_during_business_day_secs),
            business_day_end: config.business_day_end,
        },
        gate: TimeWindowGate::new(config.morning_start_time, config.evening_end_time),
        variants: VariantPolicy {
            earliest_supported_date: config.earliest_supported_date,
            prior_year_offset: Days::new(config.prior_year_date_offset_days),
        },
        wait_at_run_start: secs(config.wait_at_run_start_secs),
        gate_poll_interval: secs(config.gate_poll_interval_secs),
    })
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}
