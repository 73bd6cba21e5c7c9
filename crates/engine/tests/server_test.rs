mod common;

use axum::http::StatusCode;
use chrono::{Duration, TimeZone, Utc};
use common::{memory_db, seed_task, seed_user, RecordingNotifier, TestDb};
use maintwatch_engine::{
    alerts::{AlertCalculator, AlertDispatcher, AlertScheduler, AlertWindows, SchedulerSettings},
    config::Config,
    notify::{BroadcastBus, EventBus, LiveEvent},
    server::Server,
    store::{AlertLevel, TaskStatus},
};
use serde_json::json;
use std::sync::Arc;

fn test_server(db: &TestDb, notifier: Arc<RecordingNotifier>) -> axum_test::TestServer {
    test_server_with_bus(db, notifier, BroadcastBus::default())
}

fn test_server_with_bus(
    db: &TestDb,
    notifier: Arc<RecordingNotifier>,
    bus: BroadcastBus,
) -> axum_test::TestServer {
    let dispatcher = AlertDispatcher::new(
        db.repos.contacts.clone(),
        db.repos.alert_events.clone(),
        notifier,
        Arc::new(bus.clone()),
        "Maintenance Administration",
    );
    let scheduler = AlertScheduler::new(
        db.repos.tasks.clone(),
        db.repos.alert_events.clone(),
        AlertCalculator::new(AlertWindows::default()),
        Arc::new(dispatcher),
        SchedulerSettings::default(),
    );

    let server = Server::new(&Config::default(), db.repos.clone(), Arc::new(scheduler), bus);
    axum_test::TestServer::builder()
        .http_transport()
        .build(server.build_router())
        .unwrap()
}

#[tokio::test]
async fn test_health_and_metrics() {
    let db = memory_db().await;
    let client = test_server(&db, Arc::new(RecordingNotifier::default()));

    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");

    let response = client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_schedule_endpoints() {
    let db = memory_db().await;
    let user = seed_user(&db.pool, "tech@example.com").await;
    let start = Utc.with_ymd_and_hms(2030, 3, 4, 8, 0, 0).unwrap();
    let task = seed_task(&db.pool, "Inspect boiler", TaskStatus::Open, start, start + Duration::hours(4), user).await;
    let client = test_server(&db, Arc::new(RecordingNotifier::default()));
    let path = format!("/tasks/{}/schedule", task);

    let response = client.get(&path).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // Edit-form shape with snake_case keys.
    let response = client
        .put(&path)
        .json(&json!({
            "frequency": "yearly",
            "yearly_mode": "weekday",
            "yearly_ordinal": "second",
            "yearly_weekday": 2,
            "yearly_month": 0
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["schedule"]["pattern_variant"], "monthly_nth");
    assert_eq!(body["schedule"]["week_of_month"], 2);
    assert_eq!(body["schedule"]["weekday"], 2);
    assert_eq!(body["schedule"]["month"], 1);
    assert!(body["schedule"]["monthday"].is_null());

    let response = client.get(&path).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["schedule"]["repeat_kind"], "yearly");
    assert!(body["next_occurrence"].is_string());

    let response = client.delete(&path).await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let response = client.delete(&path).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // Date input value from the creation form.
    let response = client
        .put(&path)
        .json(&json!({
            "recurrence": "daily",
            "interval": 2,
            "recurrence_end_date": "2031-06-30"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["schedule"]["repeat_kind"], "daily");
    assert_eq!(body["schedule"]["until"], "2031-06-30T23:59:59Z");

    let response = client.put("/tasks/999/schedule").json(&json!({ "recurrence": "daily" })).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_evaluate_and_alert_history() {
    let db = memory_db().await;
    let user = seed_user(&db.pool, "tech@example.com").await;
    let now = Utc::now();
    let task = seed_task(
        &db.pool,
        "Overdue lubrication",
        TaskStatus::InProgress,
        now - Duration::days(10),
        now - Duration::days(5),
        user,
    )
    .await;
    let notifier = Arc::new(RecordingNotifier::default());
    let client = test_server(&db, notifier.clone());

    let response = client.post(&format!("/tasks/{}/evaluate", task)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"]["result"], "dispatched");
    assert_eq!(body["outcome"]["level"], "Level3");
    assert_eq!(notifier.messages().len(), 1);

    let response = client.get(&format!("/tasks/{}/alerts", task)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    let alerts = body["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["level"], serde_json::to_value(AlertLevel::Level3).unwrap());
    assert_eq!(alerts[0]["delivered"], true);

    let response = client.get("/tasks/4242/alerts").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_socket_receives_alerts_for_its_user() {
    let db = memory_db().await;
    let user = seed_user(&db.pool, "tech@example.com").await;
    let now = Utc::now();
    let task = seed_task(
        &db.pool,
        "Overdue belt check",
        TaskStatus::InProgress,
        now - Duration::days(10),
        now - Duration::days(5),
        user,
    )
    .await;
    let bus = BroadcastBus::default();
    let client = test_server_with_bus(&db, Arc::new(RecordingNotifier::default()), bus.clone());

    let mut socket = client
        .get_websocket(&format!("/ws/{}", user))
        .await
        .into_websocket()
        .await;

    // Another user's room is not forwarded.
    bus.publish(
        &format!("user:{}", user + 1),
        LiveEvent {
            name: "alert_raised".to_string(),
            payload: json!({ "task_id": 0 }),
        },
    );

    let response = client.post(&format!("/tasks/{}/evaluate", task)).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let event: serde_json::Value = socket.receive_json().await;
    assert_eq!(event["name"], "alert_raised");
    assert_eq!(event["payload"]["task_id"], task);
    assert_eq!(event["payload"]["level"], "Level3");
    assert_eq!(event["payload"]["delivered"], true);
}
