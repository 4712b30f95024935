use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::error::ConfigResult;

/// Scheduling options as parsed from the `[schedule]` table.
///
/// Every field is required; nothing falls back to an implicit zero.
/// Durations are whole seconds, times are `"HH:MM:SS"` strings and dates are
/// `"YYYY-MM-DD"` strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Attempts per date before it is recorded as missing.
    pub max_attempts: u32,
    /// 1-indexed attempt from which failures also wait the extra amount.
    pub long_attempt_threshold: u32,
    pub wait_between_attempts_secs: u64,
    pub extra_wait_for_long_attempt_secs: u64,

    /// Pause before the first query, to avoid running back-to-back with other jobs.
    pub wait_at_run_start_secs: u64,

    /// Pause after every successful date.
    pub wait_between_queries_secs: u64,
    /// Added when a success lands before `business_day_end`.
    pub extra_wait_during_daytime_secs: u64,
    /// Added on top of the daytime wait on Monday to Friday.
    pub extra_wait_during_business_day_secs: u64,
    pub business_day_end: NaiveTime,

    /// Service window start (inclusive).
    pub morning_start_time: NaiveTime,
    /// Service window end (exclusive).
    pub evening_end_time: NaiveTime,
    pub gate_poll_interval_secs: u64,

    /// Dates before this are queried through the prior-year measures.
    pub earliest_supported_date: NaiveDate,
    pub prior_year_date_offset_days: u64,
}

impl ScheduleConfig {
    /// Parse a schedule from a TOML string holding the table's contents.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: ScheduleConfig = toml::from_str(toml_str)?;
        Ok(config)
    }
}
