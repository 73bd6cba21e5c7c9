//! Deadline alert levels for a task window.
//!
//! Same-day tasks (start and end on one local calendar date) warn once a
//! fraction of the window has elapsed; longer tasks warn a fixed lead time
//! before the end. Both reach `Level2` at the deadline and `Level3` once the
//! overdue grace has passed.

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

use crate::{normalize_instant, store::AlertLevel, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertWindows {
    /// Elapsed fraction of a same-day window that opens `Level1`.
    pub same_day_fraction: f64,
    /// Lead before the end that opens `Level1` for multi-day tasks.
    pub lead: Duration,
    /// Width of the `Level2` window starting at the deadline. One second
    /// makes `Level2` an exact-second match.
    pub deadline_window: Duration,
    /// `Level3` applies strictly after `end + overdue_grace`.
    pub overdue_grace: Duration,
    /// Offset used to decide whether start and end share a calendar day.
    pub offset: FixedOffset,
}

impl Default for AlertWindows {
    fn default() -> Self {
        Self {
            same_day_fraction: 0.8,
            lead: Duration::days(2),
            deadline_window: Duration::seconds(65),
            overdue_grace: Duration::days(2),
            offset: Utc.fix(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertCalculator {
    windows: AlertWindows,
}

impl AlertCalculator {
    pub fn new(windows: AlertWindows) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> &AlertWindows {
        &self.windows
    }

    /// Level that applies at `now`, checked in the order Level 1, Level2, Level3.
    pub fn evaluate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertLevel>> {
        let start = normalize_instant(start);
        let end = normalize_instant(end);
        let now = normalize_instant(now);

        if end < start {
            return Err(Error::InvalidWindow { start, end });
        }

        let warn_from = self.warning_start(start, end);
        let deadline_window = self.windows.deadline_window.max(Duration::seconds(1));

        if warn_from <= now && now < end {
            Ok(Some(AlertLevel::Level1))
        } else if end <= now && now < end + deadline_window {
            Ok(Some(AlertLevel::Level2))
        } else if now > end + self.windows.overdue_grace {
            Ok(Some(AlertLevel::Level3))
        } else {
            Ok(None)
        }
    }

    /// Whether start and end fall on the same local calendar date.
    pub fn is_same_day(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let offset = self.windows.offset;
        start.with_timezone(&offset).date_naive() == end.with_timezone(&offset).date_naive()
    }

    fn warning_start(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_same_day(start, end) {
            let span_ms = (end - start).num_milliseconds() as f64;
            let elapsed = Duration::milliseconds((span_ms * self.windows.same_day_fraction).round() as i64);
            normalize_instant(start + elapsed)
        } else {
            end - self.windows.lead
        }
    }
}
