use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    metrics::{ALERTS_DISPATCHED_TOTAL, ALERT_DELIVERY_FAILURES_TOTAL},
    notify::{EventBus, LiveEvent, Notifier},
    store::{AlertEvent, AlertEventRepository, AlertLevel, ContactDirectory, Task, TaskId, UserId},
    Error,
};

pub const ALERT_RAISED_EVENT: &str = "alert_raised";

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to look up contact for user {user_id}: {source}")]
    ContactLookup {
        user_id: UserId,
        #[source]
        source: Error,
    },
    #[error("Failed to record {level} alert for task {task_id}: {source}")]
    Record {
        task_id: TaskId,
        level: AlertLevel,
        #[source]
        source: Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn compose(task: &Task, level: AlertLevel, now: DateTime<Utc>, signature: &str) -> Self {
        let status_line = match level {
            AlertLevel::Level3 => "The task is overdue!".to_string(),
            _ => format!(
                "Deadline is approaching in {} day(s).",
                days_remaining(task.end_date, now)
            ),
        };

        Self {
            subject: format!("⚠️ Task \"{}\" alert - {}", task.task_name, level),
            body: format!(
                "Hello,\n\nThe task \"{}\" is still in progress.\n{}\n\nPlease take action.\n\nRegards,\n{}",
                task.task_name, status_line, signature
            ),
        }
    }
}

/// Whole days left until `end`, rounded up; zero once the deadline is reached.
pub fn days_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (end - now).num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }
}

/// Sends an alert to the task's assignee and records the alert event.
pub struct AlertDispatcher {
    contacts: Arc<dyn ContactDirectory>,
    events: Arc<dyn AlertEventRepository>,
    notifier: Arc<dyn Notifier>,
    bus: Arc<dyn EventBus>,
    signature: String,
}

impl AlertDispatcher {
    pub fn new(
        contacts: Arc<dyn ContactDirectory>,
        events: Arc<dyn AlertEventRepository>,
        notifier: Arc<dyn Notifier>,
        bus: Arc<dyn EventBus>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            contacts,
            events,
            notifier,
            bus,
            signature: signature.into(),
        }
    }

    /// Delivery problems are logged and reflected in `delivered`; only a
    /// failed contact lookup or a failed audit write is an error.
    pub async fn dispatch(
        &self,
        task: &Task,
        level: AlertLevel,
        now: DateTime<Utc>,
    ) -> Result<AlertEvent, DispatchError> {
        let address = self
            .contacts
            .contact_address(task.assigned_to)
            .await
            .map_err(|source| DispatchError::ContactLookup {
                user_id: task.assigned_to,
                source,
            })?;

        let message = AlertMessage::compose(task, level, now, &self.signature);
        let delivered = match address.as_deref() {
            Some(address) => self.deliver(task, level, address, &message).await,
            None => {
                warn!(
                    task_id = task.id,
                    user_id = task.assigned_to,
                    "Assignee has no contact address, alert not delivered"
                );
                false
            }
        };

        let event = self
            .events
            .record_alert(task.id, level, now, delivered)
            .await
            .map_err(|source| DispatchError::Record {
                task_id: task.id,
                level,
                source,
            })?;

        ALERTS_DISPATCHED_TOTAL
            .with_label_values(&[level.to_string().as_str()])
            .inc();

        self.bus.publish(
            &format!("user:{}", task.assigned_to),
            LiveEvent {
                name: ALERT_RAISED_EVENT.to_string(),
                payload: json!({
                    "task_id": task.id,
                    "task_name": task.task_name,
                    "level": level,
                    "message": message.subject,
                    "delivered": delivered,
                    "created_at": event.created_at,
                }),
            },
        );

        info!(task_id = task.id, level = %level, delivered, "Alert dispatched");
        Ok(event)
    }

    async fn deliver(&self, task: &Task, level: AlertLevel, address: &str, message: &AlertMessage) -> bool {
        match self.notifier.send(address, &message.subject, &message.body).await {
            Ok(()) => true,
            Err(e) => {
                let channel = self.notifier.channel_name();
                ALERT_DELIVERY_FAILURES_TOTAL.with_label_values(&[channel]).inc();
                warn!(
                    task_id = task.id,
                    level = %level,
                    channel,
                    error = %e,
                    "Alert delivery failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MockEventBus, MockNotifier, NotifyError};
    use crate::store::{MockAlertEventRepository, MockContactDirectory, TaskStatus};
    use chrono::{Duration, TimeZone};
    use mockall::predicate::eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap()
    }

    fn task() -> Task {
        Task {
            id: 11,
            machine_id: Some(3),
            task_name: "Inspect conveyor".to_string(),
            task_description: None,
            maintenance_type: Some("preventive".to_string()),
            status: TaskStatus::InProgress,
            start_date: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap(),
            assigned_to: 5,
            creator: Some(1),
        }
    }

    fn recorded(delivered: bool) -> impl Fn(TaskId, AlertLevel, DateTime<Utc>, bool) -> crate::Result<AlertEvent> {
        move |task_id, level, at, d| {
            assert_eq!(d, delivered);
            Ok(AlertEvent {
                id: 1,
                task_id,
                level,
                delivered: d,
                created_at: at,
            })
        }
    }

    fn quiet_bus() -> MockEventBus {
        let mut bus = MockEventBus::new();
        bus.expect_publish().returning(|_, _| ());
        bus
    }

    #[test]
    fn test_compose_countdown_message() {
        let message = AlertMessage::compose(&task(), AlertLevel::Level1, now(), "Maintenance Administration");
        assert_eq!(message.subject, "⚠️ Task \"Inspect conveyor\" alert - Level 1");
        assert!(message.body.contains("Deadline is approaching in 2 day(s)."));
        assert!(message.body.ends_with("Regards,\nMaintenance Administration"));
    }

    #[test]
    fn test_compose_overdue_message() {
        let message = AlertMessage::compose(&task(), AlertLevel::Level3, now(), "Ops");
        assert!(message.body.contains("The task is overdue!"));
        assert!(!message.body.contains("day(s)"));
    }

    #[test]
    fn test_days_remaining_rounds_up() {
        let end = now() + Duration::hours(25);
        assert_eq!(days_remaining(end, now()), 2);
        assert_eq!(days_remaining(now() + Duration::days(1), now()), 1);
        assert_eq!(days_remaining(now(), now()), 0);
        assert_eq!(days_remaining(now() - Duration::hours(1), now()), 0);
    }

    #[tokio::test]
    async fn test_dispatch_sends_and_records_delivered() {
        let mut contacts = MockContactDirectory::new();
        contacts
            .expect_contact_address()
            .with(eq(5))
            .returning(|_| Ok(Some("tech@example.com".to_string())));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|address, subject, _| address == "tech@example.com" && subject.contains("Level 1"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut events = MockAlertEventRepository::new();
        events
            .expect_record_alert()
            .with(eq(11), eq(AlertLevel::Level1), eq(now()), eq(true))
            .times(1)
            .returning(recorded(true));

        let mut bus = MockEventBus::new();
        bus.expect_publish()
            .withf(|room, event| room == "user:5" && event.name == ALERT_RAISED_EVENT)
            .times(1)
            .returning(|_, _| ());

        let dispatcher = AlertDispatcher::new(
            Arc::new(contacts),
            Arc::new(events),
            Arc::new(notifier),
            Arc::new(bus),
            "Ops",
        );
        let event = dispatcher.dispatch(&task(), AlertLevel::Level1, now()).await.unwrap();
        assert!(event.delivered);
    }

    #[tokio::test]
    async fn test_send_failure_still_records_event() {
        let mut contacts = MockContactDirectory::new();
        contacts
            .expect_contact_address()
            .returning(|_| Ok(Some("tech@example.com".to_string())));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(1)
            .returning(|_, _, _| Err(NotifyError::Smtp("connection refused".to_string())));
        notifier.expect_channel_name().return_const("email");

        let mut events = MockAlertEventRepository::new();
        events.expect_record_alert().times(1).returning(recorded(false));

        let dispatcher = AlertDispatcher::new(
            Arc::new(contacts),
            Arc::new(events),
            Arc::new(notifier),
            Arc::new(quiet_bus()),
            "Ops",
        );
        let event = dispatcher.dispatch(&task(), AlertLevel::Level3, now()).await.unwrap();
        assert!(!event.delivered);
    }

    #[tokio::test]
    async fn test_missing_contact_records_undelivered() {
        let mut contacts = MockContactDirectory::new();
        contacts.expect_contact_address().returning(|_| Ok(None));

        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();

        let mut events = MockAlertEventRepository::new();
        events.expect_record_alert().times(1).returning(recorded(false));

        let dispatcher = AlertDispatcher::new(
            Arc::new(contacts),
            Arc::new(events),
            Arc::new(notifier),
            Arc::new(quiet_bus()),
            "Ops",
        );
        assert!(dispatcher.dispatch(&task(), AlertLevel::Level2, now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_contact_lookup_failure_is_error() {
        let mut contacts = MockContactDirectory::new();
        contacts
            .expect_contact_address()
            .returning(|_| Err(Error::Internal("pool closed".to_string())));

        let mut events = MockAlertEventRepository::new();
        events.expect_record_alert().never();

        let dispatcher = AlertDispatcher::new(
            Arc::new(contacts),
            Arc::new(events),
            Arc::new(MockNotifier::new()),
            Arc::new(MockEventBus::new()),
            "Ops",
        );
        let err = dispatcher.dispatch(&task(), AlertLevel::Level1, now()).await.unwrap_err();
        assert!(matches!(err, DispatchError::ContactLookup { user_id: 5, .. }));
    }
}
