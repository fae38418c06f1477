//! Durable queue abstraction

use async_trait::async_trait;
use std::time::Duration;
use tourline_shared::ChatError;

use super::NotificationEvent;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
    #[error("Encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

impl From<QueueError> for ChatError {
    fn from(err: QueueError) -> Self {
        ChatError::BrokerUnavailable(err.to_string())
    }
}

/// An event taken off the queue and held in flight until acked or requeued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    /// Payload exactly as stored; acknowledgment matches on it
    pub raw: String,
}

impl QueuedEvent {
    pub fn encode(event: &NotificationEvent) -> Result<Self, QueueError> {
        Ok(Self {
            raw: serde_json::to_string(event)?,
        })
    }

    pub fn decode(&self) -> Result<NotificationEvent, serde_json::Error> {
        serde_json::from_str(&self.raw)
    }
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, channel: &str, event: &NotificationEvent) -> Result<(), QueueError>;

    /// Wait up to `timeout` for the next event. The returned event stays in
    /// flight until [`ack`](Self::ack) or [`requeue`](Self::requeue).
    async fn dequeue(
        &self,
        channel: &str,
        timeout: Duration,
    ) -> Result<Option<QueuedEvent>, QueueError>;

    async fn ack(&self, channel: &str, event: &QueuedEvent) -> Result<(), QueueError>;

    /// Return an in-flight event to the front of the queue
    async fn requeue(&self, channel: &str, event: &QueuedEvent) -> Result<(), QueueError>;

    /// Move events left in flight by a previous consumer back onto the queue
    async fn recover(&self, channel: &str) -> Result<usize, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}
