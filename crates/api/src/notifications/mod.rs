//! Notification bridge between business events and the staff room
//!
//! Producers hand events to a [`Notifier`], which enqueues them on a durable
//! named channel and never fails the calling request. A single
//! [`RelayConsumer`] per channel drains the queue into the gateway's staff
//! room, acknowledging each event only after the relay attempt.
//!
//! - [`MemoryQueue`]: in-process queue for tests and broker-less runs
//! - [`RedisQueue`]: Redis lists with a per-channel processing list

mod memory_queue;
mod queue;
mod redis_queue;
mod relay;

pub use memory_queue::MemoryQueue;
pub use queue::{NotificationQueue, QueueError, QueuedEvent};
pub use redis_queue::RedisQueue;
pub use relay::{broker_backoff, RelayConsumer, RelayError, StaffRelay};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tourline_shared::ChatError;
use uuid::Uuid;

/// Categories produced by the conversation services
pub mod category {
    pub const SUPPORT_REQUEST: &str = "support_request";
    pub const SUPPORT_FEEDBACK: &str = "support_feedback";
}

/// Event carried on the notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub category: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl NotificationEvent {
    pub fn new(
        category: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: category.into(),
            title: title.into(),
            message: message.into(),
            data,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Producer-side handle to the notification channel
#[derive(Clone)]
pub struct Notifier {
    queue: Arc<dyn NotificationQueue>,
    channel: String,
}

impl Notifier {
    pub fn new(queue: Arc<dyn NotificationQueue>, channel: impl Into<String>) -> Self {
        Self {
            queue,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Enqueue an event. Failures are logged and swallowed; returns whether
    /// the event reached the queue.
    pub async fn publish(&self, event: NotificationEvent) -> bool {
        match self.queue.enqueue(&self.channel, &event).await {
            Ok(()) => {
                tracing::debug!(
                    channel = %self.channel,
                    notification_id = %event.id,
                    category = %event.category,
                    "Notification enqueued"
                );
                true
            }
            Err(e) => {
                let err = ChatError::from(e);
                tracing::warn!(
                    channel = %self.channel,
                    notification_id = %event.id,
                    category = %event.category,
                    code = err.code(),
                    error = %err,
                    "Failed to enqueue notification, dropping"
                );
                false
            }
        }
    }

    /// Broker reachability, for readiness checks
    pub async fn is_healthy(&self) -> bool {
        self.queue.ping().await.is_ok()
    }
}
