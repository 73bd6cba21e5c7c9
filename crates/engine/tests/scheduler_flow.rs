mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{memory_db, seed_task, seed_user, set_status, RecordingNotifier, TestDb};
use maintwatch_engine::{
    alerts::{AlertCalculator, AlertDispatcher, AlertScheduler, AlertWindows, SchedulerSettings},
    notify::{BroadcastBus, Notifier},
    store::{AlertLevel, TaskStatus},
};
use std::sync::Arc;

fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
}

fn scheduler(db: &TestDb, notifier: Arc<dyn Notifier>, bus: Arc<BroadcastBus>) -> AlertScheduler {
    let dispatcher = AlertDispatcher::new(
        db.repos.contacts.clone(),
        db.repos.alert_events.clone(),
        notifier,
        bus,
        "Maintenance Administration",
    );
    AlertScheduler::new(
        db.repos.tasks.clone(),
        db.repos.alert_events.clone(),
        AlertCalculator::new(AlertWindows::default()),
        Arc::new(dispatcher),
        SchedulerSettings::default(),
    )
}

#[tokio::test]
async fn test_same_day_task_walks_through_levels() {
    let db = memory_db().await;
    let user = seed_user(&db.pool, "tech@example.com").await;
    let task = seed_task(&db.pool, "Replace hydraulic filter", TaskStatus::InProgress, at(10, 8, 0), at(10, 18, 0), user).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let bus = Arc::new(BroadcastBus::default());
    let mut live = bus.subscribe();
    let scheduler = scheduler(&db, notifier.clone(), bus);

    assert_eq!(scheduler.tick(at(10, 15, 0)).await.unwrap().dispatched, 0);
    assert_eq!(scheduler.tick(at(10, 16, 0)).await.unwrap().dispatched, 1);
    // Still Level 1 a minute later: no second mail.
    assert_eq!(scheduler.tick(at(10, 16, 1)).await.unwrap().dispatched, 0);
    assert_eq!(scheduler.tick(at(10, 18, 0)).await.unwrap().dispatched, 1);
    assert_eq!(scheduler.tick(at(12, 19, 0)).await.unwrap().dispatched, 1);
    assert_eq!(scheduler.tick(at(12, 20, 0)).await.unwrap().dispatched, 0);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.address == "tech@example.com"));
    assert_eq!(messages[0].subject, "⚠️ Task \"Replace hydraulic filter\" alert - Level 1");
    assert!(messages[0].body.contains("Deadline is approaching in 1 day(s)."));
    assert_eq!(messages[1].subject, "⚠️ Task \"Replace hydraulic filter\" alert - Level2");
    assert!(messages[2].body.contains("The task is overdue!"));

    let levels: Vec<_> = db
        .repos
        .alert_events
        .list_alerts_for_task(task)
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.level, e.delivered))
        .collect();
    assert_eq!(
        levels,
        vec![
            (AlertLevel::Level1, true),
            (AlertLevel::Level2, true),
            (AlertLevel::Level3, true),
        ]
    );

    let first = live.recv().await.unwrap();
    assert_eq!(first.room, format!("user:{}", user));
    assert_eq!(first.event.name, "alert_raised");
    assert_eq!(first.event.payload["level"], "Level 1");
}

#[tokio::test]
async fn test_restart_does_not_resend_recorded_alerts() {
    let db = memory_db().await;
    let user = seed_user(&db.pool, "tech@example.com").await;
    seed_task(&db.pool, "Calibrate scale", TaskStatus::InProgress, at(1, 0, 0), at(10, 0, 0), user).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let first_run = scheduler(&db, notifier.clone(), Arc::new(BroadcastBus::default()));
    assert_eq!(first_run.tick(at(8, 12, 0)).await.unwrap().dispatched, 1);

    // A fresh scheduler has an empty ledger; the stored event still blocks a resend.
    let second_run = scheduler(&db, notifier.clone(), Arc::new(BroadcastBus::default()));
    let report = second_run.tick(at(8, 13, 0)).await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_is_recorded_and_not_resent() {
    let db = memory_db().await;
    let user = seed_user(&db.pool, "tech@example.com").await;
    let task = seed_task(&db.pool, "Flush coolant", TaskStatus::InProgress, at(1, 0, 0), at(3, 0, 0), user).await;

    let notifier = Arc::new(RecordingNotifier::failing());
    let scheduler = scheduler(&db, notifier.clone(), Arc::new(BroadcastBus::default()));

    assert_eq!(scheduler.tick(at(8, 0, 0)).await.unwrap().dispatched, 1);
    assert_eq!(scheduler.tick(at(8, 0, 1)).await.unwrap().dispatched, 0);

    let events = db.repos.alert_events.list_alerts_for_task(task).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, AlertLevel::Level3);
    assert!(!events[0].delivered);
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_completed_tasks_drop_out_of_the_tick() {
    let db = memory_db().await;
    let user = seed_user(&db.pool, "tech@example.com").await;
    let task = seed_task(&db.pool, "Tighten anchors", TaskStatus::InProgress, at(1, 0, 0), at(10, 0, 0), user).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, notifier.clone(), Arc::new(BroadcastBus::default()));

    set_status(&db.pool, task, TaskStatus::Completed).await;
    let report = scheduler.tick(at(8, 12, 0)).await.unwrap();
    assert_eq!(report.evaluated, 0);
    assert!(notifier.messages().is_empty());

    set_status(&db.pool, task, TaskStatus::InProgress).await;
    let report = scheduler.tick(at(8, 12, 1)).await.unwrap();
    assert_eq!(report.dispatched, 1);
}

#[tokio::test]
async fn test_assignee_without_address_is_recorded_undelivered() {
    let db = memory_db().await;
    let user = seed_user(&db.pool, "tech@example.com").await;
    let task = seed_task(&db.pool, "Replace seals", TaskStatus::InProgress, at(1, 0, 0), at(10, 0, 0), user).await;
    sqlx::query("UPDATE users SET email = '' WHERE user_id = ?1")
        .bind(user)
        .execute(&db.pool)
        .await
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&db, notifier.clone(), Arc::new(BroadcastBus::default()));
    assert_eq!(scheduler.tick(at(9, 0, 0)).await.unwrap().dispatched, 1);

    assert!(notifier.messages().is_empty());
    let events = db.repos.alert_events.list_alerts_for_task(task).await.unwrap();
    assert!(!events[0].delivered);
}
