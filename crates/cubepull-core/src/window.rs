use chrono::NaiveTime;

/// Daily service window during which queries may start.
///
/// The window is half-open: `[start, end)`. A start later than the end
/// describes a window that wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindowGate {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeWindowGate {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn is_open(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }
}
