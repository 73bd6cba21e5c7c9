use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatKind {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Discriminates the fixed day-of-month encoding from the
/// nth-weekday-of-month encoding of monthly and yearly schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternVariant {
    Standard,
    MonthlyNth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeekOfMonth {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl WeekOfMonth {
    /// Maps the ordinal words used by the planning forms.
    pub fn from_ordinal(ordinal: &str) -> Option<Self> {
        match ordinal.trim().to_lowercase().as_str() {
            "first" => Some(WeekOfMonth::First),
            "second" => Some(WeekOfMonth::Second),
            "third" => Some(WeekOfMonth::Third),
            "fourth" => Some(WeekOfMonth::Fourth),
            "last" => Some(WeekOfMonth::Last),
            _ => None,
        }
    }

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            1 => Some(WeekOfMonth::First),
            2 => Some(WeekOfMonth::Second),
            3 => Some(WeekOfMonth::Third),
            4 => Some(WeekOfMonth::Fourth),
            -1 => Some(WeekOfMonth::Last),
            _ => None,
        }
    }

    /// Stored ordinal: 1..=4, or -1 for the last week.
    pub fn index(self) -> i32 {
        match self {
            WeekOfMonth::First => 1,
            WeekOfMonth::Second => 2,
            WeekOfMonth::Third => 3,
            WeekOfMonth::Fourth => 4,
            WeekOfMonth::Last => -1,
        }
    }
}

/// 0 = Sunday .. 6 = Saturday.
pub fn weekday_from_index(index: i64) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

pub fn weekday_index(weekday: Weekday) -> i32 {
    weekday.num_days_from_sunday() as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthlyPattern {
    Standard {
        monthday: u32,
    },
    NthWeekday {
        week_of_month: WeekOfMonth,
        weekday: Weekday,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repeat {
    None,
    Daily,
    Weekly { weekdays: Vec<Weekday> },
    Monthly(MonthlyPattern),
    Yearly { month: u32, pattern: MonthlyPattern },
}

/// Canonical recurrence of a maintenance task.
///
/// The day-of-month and nth-weekday encodings are variants of
/// [`MonthlyPattern`], so a schedule carrying both cannot be built. The flat
/// column layout lives in [`ScheduleRow`], which is also the serde shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ScheduleRow", try_from = "ScheduleRow")]
pub struct ScheduleSpec {
    pub repeat: Repeat,
    pub interval: u32,
    pub until: Option<DateTime<Utc>>,
}

impl ScheduleSpec {
    pub fn none() -> Self {
        Self {
            repeat: Repeat::None,
            interval: 1,
            until: None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self.repeat, Repeat::None)
    }

    pub fn repeat_kind(&self) -> RepeatKind {
        match self.repeat {
            Repeat::None => RepeatKind::None,
            Repeat::Daily => RepeatKind::Daily,
            Repeat::Weekly { .. } => RepeatKind::Weekly,
            Repeat::Monthly(_) => RepeatKind::Monthly,
            Repeat::Yearly { .. } => RepeatKind::Yearly,
        }
    }

    fn pattern(&self) -> Option<&MonthlyPattern> {
        match &self.repeat {
            Repeat::Monthly(pattern) | Repeat::Yearly { pattern, .. } => Some(pattern),
            _ => None,
        }
    }

    pub fn pattern_variant(&self) -> PatternVariant {
        match self.pattern() {
            Some(MonthlyPattern::NthWeekday { .. }) => PatternVariant::MonthlyNth,
            _ => PatternVariant::Standard,
        }
    }

    pub fn monthday(&self) -> Option<u32> {
        match self.pattern() {
            Some(MonthlyPattern::Standard { monthday }) => Some(*monthday),
            _ => None,
        }
    }

    pub fn week_of_month(&self) -> Option<WeekOfMonth> {
        match self.pattern() {
            Some(MonthlyPattern::NthWeekday { week_of_month, .. }) => Some(*week_of_month),
            _ => None,
        }
    }

    pub fn weekday(&self) -> Option<Weekday> {
        match self.pattern() {
            Some(MonthlyPattern::NthWeekday { weekday, .. }) => Some(*weekday),
            _ => None,
        }
    }

    pub fn month(&self) -> Option<u32> {
        match self.repeat {
            Repeat::Yearly { month, .. } => Some(month),
            _ => None,
        }
    }

    pub fn weekdays(&self) -> &[Weekday] {
        match &self.repeat {
            Repeat::Weekly { weekdays } => weekdays,
            _ => &[],
        }
    }
}

/// Flat persisted form of a [`ScheduleSpec`], one nullable column per field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub repeat_kind: RepeatKind,
    pub interval: i32,
    pub weekdays: Option<Vec<i32>>,
    pub pattern_variant: PatternVariant,
    pub monthday: Option<i32>,
    pub week_of_month: Option<i32>,
    pub weekday: Option<i32>,
    pub month: Option<i32>,
    pub until: Option<DateTime<Utc>>,
}

impl From<&ScheduleSpec> for ScheduleRow {
    fn from(spec: &ScheduleSpec) -> Self {
        let weekdays = match &spec.repeat {
            Repeat::Weekly { weekdays } => {
                Some(weekdays.iter().copied().map(weekday_index).collect())
            }
            _ => None,
        };

        Self {
            repeat_kind: spec.repeat_kind(),
            interval: i32::try_from(spec.interval).unwrap_or(i32::MAX),
            weekdays,
            pattern_variant: spec.pattern_variant(),
            monthday: spec.monthday().map(|d| d as i32),
            week_of_month: spec.week_of_month().map(WeekOfMonth::index),
            weekday: spec.weekday().map(weekday_index),
            month: spec.month().map(|m| m as i32),
            until: spec.until,
        }
    }
}

impl From<ScheduleSpec> for ScheduleRow {
    fn from(spec: ScheduleSpec) -> Self {
        ScheduleRow::from(&spec)
    }
}

impl TryFrom<ScheduleRow> for ScheduleSpec {
    type Error = Error;

    fn try_from(row: ScheduleRow) -> Result<Self> {
        let interval = u32::try_from(row.interval)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| Error::Validation(format!("interval must be positive, got {}", row.interval)))?;

        let repeat = match row.repeat_kind {
            RepeatKind::None | RepeatKind::Daily | RepeatKind::Weekly => {
                if row.monthday.is_some()
                    || row.week_of_month.is_some()
                    || row.weekday.is_some()
                    || row.month.is_some()
                    || row.pattern_variant != PatternVariant::Standard
                {
                    return Err(Error::Validation(format!(
                        "{} schedule must not carry monthly or yearly fields",
                        row.repeat_kind
                    )));
                }
                match row.repeat_kind {
                    RepeatKind::None => Repeat::None,
                    RepeatKind::Daily => Repeat::Daily,
                    _ => {
                        let mut weekdays = Vec::new();
                        for index in row.weekdays.as_deref().unwrap_or_default() {
                            let weekday = weekday_from_index(i64::from(*index)).ok_or_else(|| {
                                Error::Validation(format!("weekday index out of range: {}", index))
                            })?;
                            weekdays.push(weekday);
                        }
                        Repeat::Weekly { weekdays }
                    }
                }
            }
            RepeatKind::Monthly => {
                if row.month.is_some() {
                    return Err(Error::Validation(
                        "monthly schedule must not carry a month".to_string(),
                    ));
                }
                Repeat::Monthly(pattern_from_row(&row)?)
            }
            RepeatKind::Yearly => {
                let month = row
                    .month
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| Error::Validation(format!("yearly schedule needs a month in 1..=12, got {:?}", row.month)))?;
                Repeat::Yearly {
                    month: month as u32,
                    pattern: pattern_from_row(&row)?,
                }
            }
        };

        Ok(ScheduleSpec {
            repeat,
            interval,
            until: row.until,
        })
    }
}

fn pattern_from_row(row: &ScheduleRow) -> Result<MonthlyPattern> {
    match (row.pattern_variant, row.monthday, row.week_of_month, row.weekday) {
        (PatternVariant::Standard, Some(day), None, None) if (1..=31).contains(&day) => {
            Ok(MonthlyPattern::Standard {
                monthday: day as u32,
            })
        }
        (PatternVariant::MonthlyNth, None, Some(week), Some(day)) => {
            let week_of_month = WeekOfMonth::from_index(week)
                .ok_or_else(|| Error::Validation(format!("week_of_month out of range: {}", week)))?;
            let weekday = weekday_from_index(i64::from(day))
                .ok_or_else(|| Error::Validation(format!("weekday out of range: {}", day)))?;
            Ok(MonthlyPattern::NthWeekday {
                week_of_month,
                weekday,
            })
        }
        _ => Err(Error::Validation(format!(
            "{} schedule must set either monthday or week_of_month with weekday for variant {}",
            row.repeat_kind, row.pattern_variant
        ))),
    }
}

impl fmt::Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatKind::None => write!(f, "none"),
            RepeatKind::Daily => write!(f, "daily"),
            RepeatKind::Weekly => write!(f, "weekly"),
            RepeatKind::Monthly => write!(f, "monthly"),
            RepeatKind::Yearly => write!(f, "yearly"),
        }
    }
}

impl FromStr for RepeatKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(RepeatKind::None),
            "daily" => Ok(RepeatKind::Daily),
            "weekly" => Ok(RepeatKind::Weekly),
            "monthly" => Ok(RepeatKind::Monthly),
            "yearly" => Ok(RepeatKind::Yearly),
            _ => Err(Error::Validation(format!("Invalid repeat kind: {}", s))),
        }
    }
}

impl fmt::Display for PatternVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternVariant::Standard => write!(f, "standard"),
            PatternVariant::MonthlyNth => write!(f, "monthly_nth"),
        }
    }
}

impl FromStr for PatternVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(PatternVariant::Standard),
            "monthly_nth" => Ok(PatternVariant::MonthlyNth),
            _ => Err(Error::Validation(format!("Invalid pattern variant: {}", s))),
        }
    }
}
