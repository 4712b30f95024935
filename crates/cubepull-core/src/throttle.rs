use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};

/// Pause taken after each successful date, longer while people are at work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub base_wait: Duration,
    /// Added when the success lands before `business_day_end`.
    pub daytime_extra: Duration,
    /// Added on top of `daytime_extra` when that day is also Monday to Friday.
    pub business_day_extra: Duration,
    pub business_day_end: NaiveTime,
}

impl ThrottlePolicy {
    pub fn wait_after_success(&self, now: NaiveDateTime) -> Duration {
        let mut wait = self.base_wait;

        if now.time() < self.business_day_end {
            wait = wait.saturating_add(self.daytime_extra);
            if is_weekday(now.weekday()) {
                wait = wait.saturating_add(self.business_day_extra);
            }
        }

        wait
    }
}

fn is_weekday(day: Weekday) -> bool {
    !matches!(day, Weekday::Sat | Weekday::Sun)
}
