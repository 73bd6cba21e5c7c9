use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{
    recurrence::{ScheduleRow, ScheduleSpec},
    Error, Result,
};

pub type TaskId = i64;
pub type UserId = i64;

// Preventive-maintenance task, as read by the alerting engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub machine_id: Option<i64>,
    pub task_name: String,
    pub task_description: Option<String>,
    pub maintenance_type: Option<String>,
    pub status: TaskStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub assigned_to: UserId,
    pub creator: Option<UserId>,
}

/// Status literals as written by the task routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "Open")]
    Open,
    #[serde(rename = "In progress")]
    InProgress,
    #[serde(rename = "Pending Review")]
    PendingReview,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    /// Deadline approaching.
    #[serde(rename = "Level 1")]
    Level1,
    /// At the deadline.
    #[serde(rename = "Level2")]
    Level2,
    /// Overdue.
    #[serde(rename = "Level3")]
    Level3,
}

// Immutable audit row written once per (task, level)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: i64,
    pub task_id: TaskId,
    pub level: AlertLevel,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TaskRecord {
    pub maintenance_id: i64,
    pub machine_id: Option<i64>,
    pub task_name: String,
    pub task_description: Option<String>,
    pub maintenance_type: Option<String>,
    pub task_status: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub assigned_to: i64,
    pub creator: Option<i64>,
}

impl TryFrom<TaskRecord> for Task {
    type Error = Error;

    fn try_from(r: TaskRecord) -> Result<Self> {
        Ok(Task {
            id: r.maintenance_id,
            machine_id: r.machine_id,
            task_name: r.task_name,
            task_description: r.task_description,
            maintenance_type: r.maintenance_type,
            status: r.task_status.parse()?,
            start_date: r.start_date,
            end_date: r.end_date,
            assigned_to: r.assigned_to,
            creator: r.creator,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ScheduleRecord {
    pub repeat_kind: String,
    pub repeat_interval: i32,
    pub weekdays: Option<String>,
    pub pattern_variant: String,
    pub monthday: Option<i32>,
    pub week_of_month: Option<i32>,
    pub weekday: Option<i32>,
    pub month: Option<i32>,
    pub until: Option<DateTime<Utc>>,
}

impl ScheduleRecord {
    pub fn from_spec(spec: &ScheduleSpec) -> Result<Self> {
        let row = ScheduleRow::from(spec);
        let weekdays = row
            .weekdays
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            repeat_kind: row.repeat_kind.to_string(),
            repeat_interval: row.interval,
            weekdays,
            pattern_variant: row.pattern_variant.to_string(),
            monthday: row.monthday,
            week_of_month: row.week_of_month,
            weekday: row.weekday,
            month: row.month,
            until: row.until,
        })
    }
}

impl TryFrom<ScheduleRecord> for ScheduleSpec {
    type Error = Error;

    fn try_from(r: ScheduleRecord) -> Result<Self> {
        let weekdays: Option<Vec<i32>> = r
            .weekdays
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        ScheduleSpec::try_from(ScheduleRow {
            repeat_kind: r.repeat_kind.parse()?,
            interval: r.repeat_interval,
            weekdays,
            pattern_variant: r.pattern_variant.parse()?,
            monthday: r.monthday,
            week_of_month: r.week_of_month,
            weekday: r.weekday,
            month: r.month,
            until: r.until,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct AlertEventRecord {
    pub alert_id: i64,
    pub maintenance_id: i64,
    pub level: String,
    pub delivered: bool,
    pub creation_date: DateTime<Utc>,
}

impl TryFrom<AlertEventRecord> for AlertEvent {
    type Error = Error;

    fn try_from(r: AlertEventRecord) -> Result<Self> {
        Ok(AlertEvent {
            id: r.alert_id,
            task_id: r.maintenance_id,
            level: r.level.parse()?,
            delivered: r.delivered,
            created_at: r.creation_date,
        })
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Open => write!(f, "Open"),
            TaskStatus::InProgress => write!(f, "In progress"),
            TaskStatus::PendingReview => write!(f, "Pending Review"),
            TaskStatus::Completed => write!(f, "Completed"),
            TaskStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Open" => Ok(TaskStatus::Open),
            "In progress" => Ok(TaskStatus::InProgress),
            "Pending Review" => Ok(TaskStatus::PendingReview),
            "Completed" => Ok(TaskStatus::Completed),
            "Cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(Error::Validation(format!("Invalid task status: {}", s))),
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Level1 => write!(f, "Level 1"),
            AlertLevel::Level2 => write!(f, "Level2"),
            AlertLevel::Level3 => write!(f, "Level3"),
        }
    }
}

impl FromStr for AlertLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Level 1" | "Level1" => Ok(AlertLevel::Level1),
            "Level2" | "Level 2" => Ok(AlertLevel::Level2),
            "Level3" | "Level 3" => Ok(AlertLevel::Level3),
            _ => Err(Error::Validation(format!("Invalid alert level: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_literals() {
        assert_eq!(TaskStatus::InProgress.to_string(), "In progress");
        assert_eq!("Pending Review".parse::<TaskStatus>().unwrap(), TaskStatus::PendingReview);
        assert!("in_progress".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_level_literals() {
        assert_eq!(AlertLevel::Level1.to_string(), "Level 1");
        assert_eq!(AlertLevel::Level3.to_string(), "Level3");
        assert_eq!("Level 3".parse::<AlertLevel>().unwrap(), AlertLevel::Level3);
        assert_eq!(serde_json::to_value(AlertLevel::Level2).unwrap(), "Level2");
    }

    #[test]
    fn test_schedule_record_rejects_corrupt_row() {
        let record = ScheduleRecord {
            repeat_kind: "monthly".to_string(),
            repeat_interval: 1,
            weekdays: None,
            pattern_variant: "standard".to_string(),
            monthday: Some(3),
            week_of_month: Some(1),
            weekday: Some(1),
            month: None,
            until: None,
        };
        assert!(matches!(ScheduleSpec::try_from(record), Err(Error::Validation(_))));
    }
}
