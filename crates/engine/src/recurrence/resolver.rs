//! Normalisation of raw recurrence form input into a [`ScheduleSpec`].
//!
//! Two request shapes reach the resolver: the creation form (camelCase keys,
//! `recurrence` for the kind) and the edit form (snake_case keys, `frequency`
//! for the kind). Both deserialize into [`RecurrenceInput`].

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    normalize_instant,
    recurrence::model::{weekday_from_index, MonthlyPattern, Repeat, RepeatKind, ScheduleSpec, WeekOfMonth},
    Error, Result,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceInput {
    #[serde(alias = "recurrence", alias = "frequency")]
    pub kind: Option<String>,
    pub interval: Option<i64>,
    pub weekdays: Option<Vec<i64>>,
    #[serde(alias = "monthly_day")]
    pub monthly_day: Option<i64>,
    #[serde(alias = "monthly_ordinal")]
    pub monthly_ordinal: Option<String>,
    #[serde(alias = "monthly_weekday")]
    pub monthly_weekday: Option<i64>,
    #[serde(alias = "yearly_mode")]
    pub yearly_mode: Option<String>,
    #[serde(alias = "yearly_day")]
    pub yearly_day: Option<i64>,
    /// 0-based month, as sent by the planning calendar.
    #[serde(alias = "yearly_month")]
    pub yearly_month: Option<i64>,
    #[serde(alias = "yearly_ordinal")]
    pub yearly_ordinal: Option<String>,
    #[serde(alias = "yearly_weekday")]
    pub yearly_weekday: Option<i64>,
    /// Raw end date: RFC 3339, a naive datetime or a bare `YYYY-MM-DD`.
    #[serde(alias = "recurrence_end_date", alias = "recurrenceEndDate")]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Apply fallback defaults; never fails.
    #[default]
    Lenient,
    /// Reject input with missing or invalid fields.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YearlyMode {
    Day,
    Weekday,
}

#[derive(Debug, Clone, Copy)]
pub struct RecurrenceResolver {
    offset: FixedOffset,
}

impl Default for RecurrenceResolver {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl RecurrenceResolver {
    /// `offset` is the site offset used to read the reference start's month.
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn resolve_with(
        &self,
        mode: ResolveMode,
        input: &RecurrenceInput,
        reference_start: DateTime<Utc>,
    ) -> Result<ScheduleSpec> {
        match mode {
            ResolveMode::Lenient => Ok(self.resolve(input, reference_start)),
            ResolveMode::Strict => self.resolve_strict(input, reference_start),
        }
    }

    pub fn resolve(&self, input: &RecurrenceInput, reference_start: DateTime<Utc>) -> ScheduleSpec {
        let reference_start = normalize_instant(reference_start);
        let interval = input
            .interval
            .filter(|n| *n >= 1)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(1);

        let repeat = match parse_kind(input.kind.as_deref()) {
            None | Some(RepeatKind::None) => Repeat::None,
            Some(RepeatKind::Daily) => Repeat::Daily,
            Some(RepeatKind::Weekly) => Repeat::Weekly {
                weekdays: normalize_weekdays(input.weekdays.as_deref().unwrap_or_default()),
            },
            Some(RepeatKind::Monthly) => Repeat::Monthly(monthly_pattern(input)),
            Some(RepeatKind::Yearly) => self.yearly(input, reference_start),
        };

        let spec = ScheduleSpec {
            repeat,
            interval,
            until: self.until(input),
        };
        debug!(
            repeat_kind = %spec.repeat_kind(),
            pattern_variant = %spec.pattern_variant(),
            "Resolved recurrence"
        );
        spec
    }

    /// Like [`resolve`](Self::resolve) but returns a validation error naming
    /// every missing or invalid field instead of applying defaults.
    pub fn resolve_strict(
        &self,
        input: &RecurrenceInput,
        reference_start: DateTime<Utc>,
    ) -> Result<ScheduleSpec> {
        let mut problems = validate(input);
        if let Some(raw) = non_empty(input.until.as_deref()) {
            if parse_until(raw, self.offset).is_none() {
                problems.push(format!("recurrence_end_date '{}' is not a valid date", raw));
            }
        }
        if !problems.is_empty() {
            return Err(Error::Validation(format!(
                "invalid recurrence: {}",
                problems.join(", ")
            )));
        }
        Ok(self.resolve(input, reference_start))
    }

    fn until(&self, input: &RecurrenceInput) -> Option<DateTime<Utc>> {
        let raw = non_empty(input.until.as_deref())?;
        let until = parse_until(raw, self.offset);
        if until.is_none() {
            debug!(recurrence_end_date = raw, "Ignoring unreadable recurrence end date");
        }
        until.map(normalize_instant)
    }

    fn yearly(&self, input: &RecurrenceInput, reference_start: DateTime<Utc>) -> Repeat {
        let month = input
            .yearly_month
            .and_then(month_from_zero_based)
            .unwrap_or_else(|| reference_start.with_timezone(&self.offset).month());

        let pattern = match parse_yearly_mode(input.yearly_mode.as_deref()) {
            Some(YearlyMode::Weekday) => MonthlyPattern::NthWeekday {
                week_of_month: input
                    .yearly_ordinal
                    .as_deref()
                    .and_then(WeekOfMonth::from_ordinal)
                    .unwrap_or(WeekOfMonth::First),
                weekday: input
                    .yearly_weekday
                    .and_then(weekday_from_index)
                    .unwrap_or(Weekday::Mon),
            },
            Some(YearlyMode::Day) | None => MonthlyPattern::Standard {
                monthday: input.yearly_day.and_then(valid_monthday).unwrap_or(1),
            },
        };

        Repeat::Yearly { month, pattern }
    }
}

/// Ordinal with weekday wins over a day-of-month; with neither the schedule
/// falls back to the 1st of the month.
fn monthly_pattern(input: &RecurrenceInput) -> MonthlyPattern {
    let nth = input
        .monthly_ordinal
        .as_deref()
        .and_then(WeekOfMonth::from_ordinal)
        .zip(input.monthly_weekday.and_then(weekday_from_index));

    match nth {
        Some((week_of_month, weekday)) => MonthlyPattern::NthWeekday {
            week_of_month,
            weekday,
        },
        None => MonthlyPattern::Standard {
            monthday: input.monthly_day.and_then(valid_monthday).unwrap_or(1),
        },
    }
}

fn validate(input: &RecurrenceInput) -> Vec<String> {
    let mut problems = Vec::new();

    if input.interval.is_some_and(|n| n < 1) {
        problems.push("interval must be positive".to_string());
    }

    let kind = match input.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        None => {
            problems.push("recurrence is required".to_string());
            return problems;
        }
        Some(raw) => match raw.parse::<RepeatKind>() {
            Ok(kind) => kind,
            Err(_) => {
                problems.push(format!("recurrence '{}' is not a known kind", raw));
                return problems;
            }
        },
    };

    match kind {
        RepeatKind::None | RepeatKind::Daily => {}
        RepeatKind::Weekly => match input.weekdays.as_deref() {
            None | Some([]) => problems.push("weekdays is required for weekly recurrence".to_string()),
            Some(days) => {
                if days.iter().any(|d| weekday_from_index(*d).is_none()) {
                    problems.push("weekdays must be indices 0..=6".to_string());
                }
            }
        },
        RepeatKind::Monthly => {
            let ordinal = input.monthly_ordinal.as_deref();
            if ordinal.is_some_and(|o| WeekOfMonth::from_ordinal(o).is_none()) {
                problems.push("monthlyOrdinal is not a known ordinal".to_string());
            }
            if input.monthly_weekday.is_some_and(|d| weekday_from_index(d).is_none()) {
                problems.push("monthlyWeekday must be 0..=6".to_string());
            }
            if input.monthly_day.is_some_and(|d| valid_monthday(d).is_none()) {
                problems.push("monthlyDay must be 1..=31".to_string());
            }
            let nth_complete = ordinal.and_then(WeekOfMonth::from_ordinal).is_some()
                && input.monthly_weekday.and_then(weekday_from_index).is_some();
            if !nth_complete && input.monthly_day.is_none() {
                problems.push("monthlyDay or monthlyOrdinal with monthlyWeekday is required".to_string());
            }
        }
        RepeatKind::Yearly => {
            if input.yearly_month.is_some_and(|m| month_from_zero_based(m).is_none()) {
                problems.push("yearlyMonth must be 0..=11".to_string());
            }
            match parse_yearly_mode(input.yearly_mode.as_deref()) {
                None => problems.push("yearlyMode must be 'day' or 'weekday'".to_string()),
                Some(YearlyMode::Day) => {
                    if input.yearly_day.and_then(valid_monthday).is_none() {
                        problems.push("yearlyDay must be 1..=31".to_string());
                    }
                }
                Some(YearlyMode::Weekday) => {
                    if input.yearly_ordinal.as_deref().and_then(WeekOfMonth::from_ordinal).is_none() {
                        problems.push("yearlyOrdinal is required".to_string());
                    }
                    if input.yearly_weekday.and_then(weekday_from_index).is_none() {
                        problems.push("yearlyWeekday must be 0..=6".to_string());
                    }
                }
            }
        }
    }

    problems
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

const NAIVE_DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// Naive forms are read at the site offset. A bare date ends the series at
/// the last second of that day.
fn parse_until(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(23, 59, 59))
        })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|at| at.with_timezone(&Utc))
}

fn parse_kind(kind: Option<&str>) -> Option<RepeatKind> {
    kind.and_then(|k| k.parse().ok())
}

fn parse_yearly_mode(mode: Option<&str>) -> Option<YearlyMode> {
    match mode.map(|m| m.trim().to_lowercase()).as_deref() {
        Some("day") => Some(YearlyMode::Day),
        Some("weekday") => Some(YearlyMode::Weekday),
        _ => None,
    }
}

fn valid_monthday(day: i64) -> Option<u32> {
    (1..=31).contains(&day).then_some(day as u32)
}

fn month_from_zero_based(month: i64) -> Option<u32> {
    (0..=11).contains(&month).then_some(month as u32 + 1)
}

/// Sorted Sunday-first, duplicates and out-of-range indices dropped.
fn normalize_weekdays(indices: &[i64]) -> Vec<Weekday> {
    let mut days: Vec<Weekday> = indices.iter().filter_map(|i| weekday_from_index(*i)).collect();
    days.sort_by_key(|d| d.num_days_from_sunday());
    days.dedup();
    days
}
