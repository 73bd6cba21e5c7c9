mod config;
mod factory;
mod models;
mod postgres;
mod sqlite;

pub use config::{DatabaseConfig, DatabaseType};
pub use factory::{create_repositories, Repositories};
pub use models::*;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::recurrence::ScheduleSpec;

#[cfg(test)]
use mockall::automock;

/// Read access to preventive-maintenance tasks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Every task whose status is "In progress", ordered by id.
    async fn list_in_progress(&self) -> crate::Result<Vec<Task>>;
    async fn get_task(&self, id: TaskId) -> crate::Result<Option<Task>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn get_schedule(&self, task_id: TaskId) -> crate::Result<Option<ScheduleSpec>>;
    /// Replaces any existing schedule for the task.
    async fn upsert_schedule(&self, task_id: TaskId, spec: &ScheduleSpec) -> crate::Result<()>;
    async fn delete_schedule(&self, task_id: TaskId) -> crate::Result<bool>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AlertEventRepository: Send + Sync {
    async fn alert_exists(&self, task_id: TaskId, level: AlertLevel) -> crate::Result<bool>;
    /// Writes the (task, level) event once. A second call for the same pair
    /// returns the row already stored.
    async fn record_alert(
        &self,
        task_id: TaskId,
        level: AlertLevel,
        at: DateTime<Utc>,
        delivered: bool,
    ) -> crate::Result<AlertEvent>;
    async fn list_alerts_for_task(&self, task_id: TaskId) -> crate::Result<Vec<AlertEvent>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Notification address of a user, `None` when the user is unknown or has none.
    async fn contact_address(&self, user_id: UserId) -> crate::Result<Option<String>>;
}

#[async_trait]
pub trait Store: TaskRepository + ScheduleRepository + AlertEventRepository + ContactDirectory {
    // Initialize database schema
    async fn init(&self) -> crate::Result<()>;
}
