//! Delivery channels for deadline alerts.
//!
//! A [`Notifier`] sends one addressed message; the [`EventBus`] fans live
//! events out to connected clients grouped by room.

mod bus;
mod email;
mod stdout;

pub use bus::{BroadcastBus, EventBus, LiveEvent, RoomMessage};
pub use email::EmailNotifier;
pub use stdout::{StdoutFormat, StdoutNotifier};

#[cfg(test)]
pub use bus::MockEventBus;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for notification channel implementations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message to `address`.
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "email", "stdout").
    fn channel_name(&self) -> &'static str;
}
