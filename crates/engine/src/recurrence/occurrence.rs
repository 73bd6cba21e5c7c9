//! Expansion of a [`ScheduleSpec`] into concrete occurrence instants.
//!
//! Arithmetic runs on the site's local wall clock so "every 10th at 08:00"
//! stays at 08:00 regardless of how the UTC instant shifts.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};

use crate::recurrence::model::{MonthlyPattern, Repeat, ScheduleSpec, WeekOfMonth};

/// Upper bound on candidate periods examined per lookup.
const MAX_PERIODS: i64 = 2_000;

impl ScheduleSpec {
    /// First occurrence strictly after `after`, counting `series_start` as the
    /// first possible occurrence. Returns `None` once the series has ended.
    pub fn next_occurrence(
        &self,
        series_start: DateTime<Utc>,
        after: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Option<DateTime<Utc>> {
        let start = series_start.with_timezone(&offset).naive_local();
        let after = after.with_timezone(&offset).naive_local();
        let interval = i64::from(self.interval.max(1));

        let found = match &self.repeat {
            Repeat::None => (start > after).then_some(start),
            Repeat::Daily => Some(next_daily(start, after, interval)),
            Repeat::Weekly { weekdays } => next_weekly(start, after, interval, weekdays),
            Repeat::Monthly(pattern) => next_monthly(start, after, interval, start.month(), pattern),
            Repeat::Yearly { month, pattern } => next_monthly(start, after, interval * 12, *month, pattern),
        }?;

        let found = offset.from_local_datetime(&found).single()?.with_timezone(&Utc);
        match self.until {
            Some(until) if found > until => None,
            _ => Some(found),
        }
    }
}

impl MonthlyPattern {
    /// The date this pattern selects in the given month, if the month has one.
    pub fn date_in(&self, year: i32, month: u32) -> Option<NaiveDate> {
        match *self {
            MonthlyPattern::Standard { monthday } => NaiveDate::from_ymd_opt(year, month, monthday),
            MonthlyPattern::NthWeekday { week_of_month, weekday } => match week_of_month {
                WeekOfMonth::Last => last_weekday_of_month(year, month, weekday),
                nth => NaiveDate::from_weekday_of_month_opt(year, month, weekday, nth.index() as u8),
            },
        }
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    let back = (last.weekday().num_days_from_sunday() + 7 - weekday.num_days_from_sunday()) % 7;
    Some(last - Duration::days(i64::from(back)))
}

fn next_daily(start: NaiveDateTime, after: NaiveDateTime, interval: i64) -> NaiveDateTime {
    if after < start {
        return start;
    }
    let period = interval * 86_400;
    let elapsed = (after - start).num_seconds();
    start + Duration::seconds((elapsed / period + 1) * period)
}

fn next_weekly(
    start: NaiveDateTime,
    after: NaiveDateTime,
    interval: i64,
    weekdays: &[Weekday],
) -> Option<NaiveDateTime> {
    let own_day = [start.weekday()];
    let days = if weekdays.is_empty() { &own_day[..] } else { weekdays };

    let week_zero = start.date() - Duration::days(i64::from(start.weekday().num_days_from_sunday()));
    let period_days = 7 * interval;
    let skip = if after > start {
        ((after.date() - week_zero).num_days() / period_days - 1).max(0)
    } else {
        0
    };

    for n in skip..skip + MAX_PERIODS {
        let week_start = week_zero + Duration::days(n * period_days);
        for day in days {
            let candidate = (week_start + Duration::days(i64::from(day.num_days_from_sunday())))
                .and_time(start.time());
            if candidate >= start && candidate > after {
                return Some(candidate);
            }
        }
    }
    None
}

fn next_monthly(
    start: NaiveDateTime,
    after: NaiveDateTime,
    step_months: i64,
    first_month: u32,
    pattern: &MonthlyPattern,
) -> Option<NaiveDateTime> {
    let base = i64::from(start.year()) * 12 + i64::from(first_month) - 1;
    let skip = if after > start {
        let target = i64::from(after.year()) * 12 + i64::from(after.month0());
        ((target - base) / step_months - 1).max(0)
    } else {
        0
    };

    for n in skip..skip + MAX_PERIODS {
        let index = base + n * step_months;
        let year = i32::try_from(index.div_euclid(12)).ok()?;
        let month = index.rem_euclid(12) as u32 + 1;
        let Some(date) = pattern.date_in(year, month) else {
            continue;
        };
        let candidate = date.and_time(start.time());
        if candidate >= start && candidate > after {
            return Some(candidate);
        }
    }
    None
}
