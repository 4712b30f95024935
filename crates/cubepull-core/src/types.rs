use std::collections::BTreeSet;
use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Durable record of extraction progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The last date whose results were written.
    pub last_pull: NaiveDate,
    /// Dates that failed every attempt and still need an out-of-band pull.
    pub missing_dates: BTreeSet<NaiveDate>,
}

impl Checkpoint {
    /// A bootstrap checkpoint: extraction resumes the day after `last_pull`.
    pub fn new(last_pull: NaiveDate) -> Self {
        Self {
            last_pull,
            missing_dates: BTreeSet::new(),
        }
    }

    /// Advance `last_pull` to `date`. Never moves it backwards.
    pub fn record_success(&mut self, date: NaiveDate) {
        if date > self.last_pull {
            self.last_pull = date;
        }
    }

    pub fn record_missing(&mut self, date: NaiveDate) {
        self.missing_dates.insert(date);
    }

    /// Remove a previously missing date. Returns false if it wasn't missing.
    pub fn resolve_missing(&mut self, date: NaiveDate) -> bool {
        self.missing_dates.remove(&date)
    }
}

/// Inclusive, ascending range of calendar dates still to be pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Build a range; `start > end` yields an empty range.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Dates after the checkpoint up to and including yesterday.
    pub fn pending(checkpoint: &Checkpoint, today: NaiveDate) -> Self {
        let start = checkpoint.last_pull.succ_opt().unwrap_or(NaiveDate::MAX);
        let end = today.pred_opt().unwrap_or(NaiveDate::MIN);
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_days() as usize + 1
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }
}

/// Which measure set and date transform a fetch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchVariant {
    /// Query the date itself against the standard measures.
    Standard,
    /// Query `date + offset` against the prior-year measures.
    PriorYearShifted,
}

impl fmt::Display for FetchVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchVariant::Standard => write!(f, "standard"),
            FetchVariant::PriorYearShifted => write!(f, "prior_year_shifted"),
        }
    }
}

/// Rules for picking a [`FetchVariant`] per date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantPolicy {
    /// Dates strictly before this one are not directly queryable.
    pub earliest_supported_date: NaiveDate,
    /// How far forward a prior-year query is shifted (364 keeps the weekday).
    pub prior_year_offset: Days,
}

impl VariantPolicy {
    pub fn variant_for(&self, date: NaiveDate) -> FetchVariant {
        if date < self.earliest_supported_date {
            FetchVariant::PriorYearShifted
        } else {
            FetchVariant::Standard
        }
    }
}

/// One date's query as handed to a [`QuerySource`](crate::QuerySource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// The date the results belong to.
    pub date: NaiveDate,
    pub variant: FetchVariant,
    /// The date actually named in the upstream query.
    pub query_date: NaiveDate,
}

impl FetchRequest {
    pub fn new(date: NaiveDate, policy: &VariantPolicy) -> Self {
        let variant = policy.variant_for(date);
        let query_date = match variant {
            FetchVariant::Standard => date,
            FetchVariant::PriorYearShifted => date
                .checked_add_days(policy.prior_year_offset)
                .unwrap_or(NaiveDate::MAX),
        };

        Self {
            date,
            variant,
            query_date,
        }
    }
}

/// Tabular result of a successful fetch. The core never looks inside.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rows {
    pub columns: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_pending_range_runs_through_yesterday() {
        let checkpoint = Checkpoint::new(date(2024, 1, 10));
        let range = DateRange::pending(&checkpoint, date(2024, 1, 14));

        assert_eq!(range.len(), 3);
        assert_eq!(
            range.iter().collect::<Vec<_>>(),
            vec![date(2024, 1, 11), date(2024, 1, 12), date(2024, 1, 13)]
        );
    }

    #[test]
    fn test_pending_range_empty_when_caught_up() {
        let checkpoint = Checkpoint::new(date(2024, 1, 13));
        let range = DateRange::pending(&checkpoint, date(2024, 1, 14));

        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
        assert_eq!(range.iter().count(), 0);
    }

    #[test]
    fn test_pending_range_crosses_month_and_leap_day() {
        let checkpoint = Checkpoint::new(date(2024, 2, 27));
        let range = DateRange::pending(&checkpoint, date(2024, 3, 2));

        assert_eq!(
            range.iter().collect::<Vec<_>>(),
            vec![date(2024, 2, 28), date(2024, 2, 29), date(2024, 3, 1)]
        );
    }

    #[test]
    fn test_variant_selection() {
        let policy = VariantPolicy {
            earliest_supported_date: date(2015, 2, 2),
            prior_year_offset: Days::new(364),
        };

        let early = FetchRequest::new(date(2015, 1, 1), &policy);
        assert_eq!(early.variant, FetchVariant::PriorYearShifted);
        assert_eq!(early.query_date, date(2015, 12, 31));

        let boundary = FetchRequest::new(date(2015, 2, 2), &policy);
        assert_eq!(boundary.variant, FetchVariant::Standard);
        assert_eq!(boundary.query_date, date(2015, 2, 2));
    }

    #[test]
    fn test_checkpoint_last_pull_never_regresses() {
        let mut checkpoint = Checkpoint::new(date(2024, 1, 10));
        checkpoint.record_success(date(2024, 1, 11));
        checkpoint.record_success(date(2024, 1, 5));
        assert_eq!(checkpoint.last_pull, date(2024, 1, 11));
    }

    #[test]
    fn test_checkpoint_missing_dates() {
        let mut checkpoint = Checkpoint::new(date(2024, 1, 10));
        checkpoint.record_missing(date(2024, 1, 12));
        checkpoint.record_missing(date(2024, 1, 12));
        assert_eq!(checkpoint.missing_dates.len(), 1);

        assert!(checkpoint.resolve_missing(date(2024, 1, 12)));
        assert!(!checkpoint.resolve_missing(date(2024, 1, 12)));
    }

    #[test]
    fn test_prior_year_shift_past_calendar_end_saturates() {
        let policy = VariantPolicy {
            earliest_supported_date: NaiveDate::MAX,
            prior_year_offset: Days::new(u64::MAX),
        };
        let request = FetchRequest::new(date(2024, 1, 10), &policy);

        assert_eq!(request.variant, FetchVariant::PriorYearShifted);
        assert_eq!(request.query_date, NaiveDate::MAX);
    }
}
