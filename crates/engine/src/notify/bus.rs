use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Named event with a JSON payload, pushed to live clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveEvent {
    pub name: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomMessage {
    pub room: String,
    pub event: LiveEvent,
}

/// Publish side of the live notification channel. Publishing is best
/// effort and never reports failure to the caller.
#[cfg_attr(test, automock)]
pub trait EventBus: Send + Sync {
    fn publish(&self, room: &str, event: LiveEvent);
}

/// In-process bus backed by a tokio broadcast channel. Socket handlers
/// subscribe and filter on the rooms their user has joined.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<RoomMessage>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, room: &str, event: LiveEvent) {
        let message = RoomMessage {
            room: room.to_string(),
            event,
        };
        match self.sender.send(message) {
            Ok(receivers) => debug!(room, receivers, "Published live event"),
            Err(_) => debug!(room, "No live subscribers, event dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribers_receive_room_messages() {
        let bus = BroadcastBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            "user:4",
            LiveEvent {
                name: "alert_raised".to_string(),
                payload: json!({ "task_id": 1 }),
            },
        );

        let message = rx.recv().await.unwrap();
        assert_eq!(message.room, "user:4");
        assert_eq!(message.event.name, "alert_raised");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = BroadcastBus::new(4);
        bus.publish(
            "user:1",
            LiveEvent {
                name: "alert_raised".to_string(),
                payload: Value::Null,
            },
        );
    }
}
