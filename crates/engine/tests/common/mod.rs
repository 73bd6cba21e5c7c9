#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maintwatch_engine::{
    notify::{Notifier, NotifyError},
    store::{Repositories, SqliteStore, Store, TaskId, TaskStatus, UserId},
};
use sqlx::{Pool, Sqlite};
use std::sync::{Arc, Mutex};

pub struct TestDb {
    pub repos: Repositories,
    pub pool: Pool<Sqlite>,
}

pub async fn memory_db() -> TestDb {
    let store = SqliteStore::new(":memory:", 1)
        .await
        .expect("Failed to open in-memory store");
    store.init().await.expect("Failed to run migrations");
    let pool = store.pool().clone();
    TestDb {
        repos: Repositories::from_store(Arc::new(store)),
        pool,
    }
}

pub async fn seed_user(pool: &Pool<Sqlite>, email: &str) -> UserId {
    sqlx::query("INSERT INTO users (email, full_name, role) VALUES (?1, ?2, 'technician')")
        .bind(email)
        .bind("Test Technician")
        .execute(pool)
        .await
        .expect("Failed to insert user")
        .last_insert_rowid()
}

pub async fn seed_task(
    pool: &Pool<Sqlite>,
    name: &str,
    status: TaskStatus,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    assigned_to: UserId,
) -> TaskId {
    sqlx::query(
        r#"
        INSERT INTO preventive_maintenance (
            machine_id, maintenance_type, task_name, task_description, task_status,
            assigned_to, creator, start_date, end_date
        ) VALUES (1, 'preventive', ?1, 'Seeded for tests', ?2, ?3, ?3, ?4, ?5)
        "#,
    )
    .bind(name)
    .bind(status.to_string())
    .bind(assigned_to)
    .bind(start)
    .bind(end)
    .execute(pool)
    .await
    .expect("Failed to insert task")
    .last_insert_rowid()
}

pub async fn set_status(pool: &Pool<Sqlite>, task_id: TaskId, status: TaskStatus) {
    sqlx::query("UPDATE preventive_maintenance SET task_status = ?1 WHERE maintenance_id = ?2")
        .bind(status.to_string())
        .bind(task_id)
        .execute(pool)
        .await
        .expect("Failed to update task status");
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub address: String,
    pub subject: String,
    pub body: String,
}

/// Notifier that keeps every message, optionally failing each send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<SentMessage>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(SentMessage {
            address: address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        if self.fail {
            return Err(NotifyError::Smtp("relay unavailable".to_string()));
        }
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "recording"
    }
}
