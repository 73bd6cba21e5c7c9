use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::{debug, error, info};

use crate::{
    recurrence::ScheduleSpec,
    store::{
        models::{AlertEventRecord, ScheduleRecord, TaskRecord},
        AlertEvent, AlertEventRepository, AlertLevel, ContactDirectory, ScheduleRepository,
        Store, Task, TaskId, TaskRepository, TaskStatus, UserId,
    },
    Error, Result,
};

pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(connection_string)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                Error::Sqlx(e)
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations/postgres")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }
}

#[async_trait]
impl TaskRepository for PostgresStore {
    async fn list_in_progress(&self) -> Result<Vec<Task>> {
        debug!("Listing in-progress tasks");

        let records = sqlx::query_as::<_, TaskRecord>(
            r#"
            SELECT maintenance_id, machine_id, task_name, task_description, maintenance_type,
                   task_status, start_date, end_date, assigned_to, creator
            FROM preventive_maintenance
            WHERE task_status = $1
            ORDER BY maintenance_id
            "#,
        )
        .bind(TaskStatus::InProgress.to_string())
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(Task::try_from).collect()
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        debug!("Getting task: {}", id);

        let record = sqlx::query_as::<_, TaskRecord>(
            r#"
            SELECT maintenance_id, machine_id, task_name, task_description, maintenance_type,
                   task_status, start_date, end_date, assigned_to, creator
            FROM preventive_maintenance
            WHERE maintenance_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Task::try_from).transpose()
    }
}

#[async_trait]
impl ScheduleRepository for PostgresStore {
    async fn get_schedule(&self, task_id: TaskId) -> Result<Option<ScheduleSpec>> {
        debug!("Getting schedule for task: {}", task_id);

        let record = sqlx::query_as::<_, ScheduleRecord>(
            r#"
            SELECT repeat_kind, repeat_interval, weekdays, pattern_variant,
                   monthday, week_of_month, weekday, month, until
            FROM maintenance_schedule
            WHERE maintenance_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(ScheduleSpec::try_from).transpose()
    }

    async fn upsert_schedule(&self, task_id: TaskId, spec: &ScheduleSpec) -> Result<()> {
        debug!("Saving schedule for task: {}", task_id);

        let record = ScheduleRecord::from_spec(spec)?;
        sqlx::query(
            r#"
            INSERT INTO maintenance_schedule (
                maintenance_id, repeat_kind, repeat_interval, weekdays, pattern_variant,
                monthday, week_of_month, weekday, month, until, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (maintenance_id) DO UPDATE SET
                repeat_kind = EXCLUDED.repeat_kind,
                repeat_interval = EXCLUDED.repeat_interval,
                weekdays = EXCLUDED.weekdays,
                pattern_variant = EXCLUDED.pattern_variant,
                monthday = EXCLUDED.monthday,
                week_of_month = EXCLUDED.week_of_month,
                weekday = EXCLUDED.weekday,
                month = EXCLUDED.month,
                until = EXCLUDED.until,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(task_id)
        .bind(&record.repeat_kind)
        .bind(record.repeat_interval)
        .bind(&record.weekdays)
        .bind(&record.pattern_variant)
        .bind(record.monthday)
        .bind(record.week_of_month)
        .bind(record.weekday)
        .bind(record.month)
        .bind(record.until)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_schedule(&self, task_id: TaskId) -> Result<bool> {
        debug!("Deleting schedule for task: {}", task_id);

        let result = sqlx::query("DELETE FROM maintenance_schedule WHERE maintenance_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AlertEventRepository for PostgresStore {
    async fn alert_exists(&self, task_id: TaskId, level: AlertLevel) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT alert_id FROM system_alerts WHERE maintenance_id = $1 AND level = $2",
        )
        .bind(task_id)
        .bind(level.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn record_alert(
        &self,
        task_id: TaskId,
        level: AlertLevel,
        at: DateTime<Utc>,
        delivered: bool,
    ) -> Result<AlertEvent> {
        debug!("Recording {} alert for task: {}", level, task_id);

        sqlx::query(
            r#"
            INSERT INTO system_alerts (maintenance_id, level, delivered, creation_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (maintenance_id, level) DO NOTHING
            "#,
        )
        .bind(task_id)
        .bind(level.to_string())
        .bind(delivered)
        .bind(at)
        .execute(&self.pool)
        .await?;

        let record = sqlx::query_as::<_, AlertEventRecord>(
            r#"
            SELECT alert_id, maintenance_id, level, delivered, creation_date
            FROM system_alerts
            WHERE maintenance_id = $1 AND level = $2
            "#,
        )
        .bind(task_id)
        .bind(level.to_string())
        .fetch_one(&self.pool)
        .await?;

        AlertEvent::try_from(record)
    }

    async fn list_alerts_for_task(&self, task_id: TaskId) -> Result<Vec<AlertEvent>> {
        let records = sqlx::query_as::<_, AlertEventRecord>(
            r#"
            SELECT alert_id, maintenance_id, level, delivered, creation_date
            FROM system_alerts
            WHERE maintenance_id = $1
            ORDER BY alert_id
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(AlertEvent::try_from).collect()
    }
}

#[async_trait]
impl ContactDirectory for PostgresStore {
    async fn contact_address(&self, user_id: UserId) -> Result<Option<String>> {
        let email: Option<String> =
            sqlx::query_scalar("SELECT email FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(email.filter(|e| !e.trim().is_empty()))
    }
}
