//! Queue consumer relaying notifications to connected staff

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, error, info, warn};

use super::{NotificationEvent, NotificationQueue, QueueError};

/// Reconnect delays doubling from `base` and capped at `max`.
///
/// `base` is rounded down to an even number of milliseconds (2ms minimum).
pub fn broker_backoff(base: Duration, max: Duration) -> ExponentialBackoff {
    let factor = (base.as_millis() as u64 / 2).max(1);
    ExponentialBackoff::from_millis(2)
        .factor(factor)
        .max_delay(max.max(base))
}

/// Destination for relayed notifications (the gateway's staff room)
#[async_trait]
pub trait StaffRelay: Send + Sync {
    /// Deliver to every connected staff member; returns how many were reached
    async fn relay(&self, event: &NotificationEvent) -> Result<usize, RelayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Gateway is shutting down")]
    Closed,
    #[error("Relay failed: {0}")]
    Failed(String),
}

/// Result of processing at most one queued event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing arrived before the poll timeout
    Idle,
    Relayed,
    /// Relay failed; the event went back to the front of the queue
    Requeued,
    /// Payload could not be decoded and was discarded
    Dropped,
}

/// Single consumer for one notification channel
pub struct RelayConsumer {
    queue: Arc<dyn NotificationQueue>,
    relay: Arc<dyn StaffRelay>,
    channel: String,
    /// Fresh strategy cloned back in after every successful connect or relay
    backoff_start: ExponentialBackoff,
    backoff: ExponentialBackoff,
    attempts: u32,
    poll_timeout: Duration,
}

impl RelayConsumer {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        relay: Arc<dyn StaffRelay>,
        channel: impl Into<String>,
        backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            queue,
            relay,
            channel: channel.into(),
            backoff_start: backoff.clone(),
            backoff,
            attempts: 0,
            poll_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        // The strategy never runs dry; fall back to the poll interval anyway
        self.backoff.next().unwrap_or(self.poll_timeout)
    }

    fn reset_backoff(&mut self) {
        self.backoff = self.backoff_start.clone();
        self.attempts = 0;
    }

    /// Take one event off the queue, relay it, then ack or requeue it
    pub async fn step(&mut self) -> Result<StepOutcome, QueueError> {
        let Some(queued) = self.queue.dequeue(&self.channel, self.poll_timeout).await? else {
            return Ok(StepOutcome::Idle);
        };

        let event = match queued.decode() {
            Ok(event) => event,
            Err(e) => {
                error!(channel = %self.channel, error = %e, "Discarding undecodable notification");
                self.queue.ack(&self.channel, &queued).await?;
                return Ok(StepOutcome::Dropped);
            }
        };

        match self.relay.relay(&event).await {
            Ok(recipients) => {
                self.queue.ack(&self.channel, &queued).await?;
                debug!(
                    channel = %self.channel,
                    notification_id = %event.id,
                    recipients = recipients,
                    "Notification relayed to staff room"
                );
                Ok(StepOutcome::Relayed)
            }
            Err(e) => {
                self.queue.requeue(&self.channel, &queued).await?;
                warn!(
                    channel = %self.channel,
                    notification_id = %event.id,
                    error = %e,
                    "Relay failed, notification requeued"
                );
                Ok(StepOutcome::Requeued)
            }
        }
    }

    /// Consume until `shutdown` flips to true.
    ///
    /// Broker failures back off exponentially; the first successful
    /// (re)connect recovers in-flight events and resets the backoff.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(channel = %self.channel, "Notification relay started");
        let mut connected = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if !connected {
                match self.queue.recover(&self.channel).await {
                    Ok(recovered) => {
                        connected = true;
                        self.reset_backoff();
                        info!(
                            channel = %self.channel,
                            recovered = recovered,
                            "Notification broker connected"
                        );
                    }
                    Err(e) => {
                        let delay = self.next_delay();
                        warn!(
                            channel = %self.channel,
                            error = %e,
                            retry_in = ?delay,
                            attempt = self.attempts,
                            "Notification broker unavailable"
                        );
                        if wait_or_shutdown(delay, &mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let outcome = tokio::select! {
                outcome = self.step() => outcome,
                _ = shutdown.changed() => break,
            };

            match outcome {
                Ok(StepOutcome::Relayed) => self.reset_backoff(),
                Ok(StepOutcome::Idle) | Ok(StepOutcome::Dropped) => {}
                Ok(StepOutcome::Requeued) => {
                    let delay = self.next_delay();
                    if wait_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "Lost notification broker");
                    connected = false;
                }
            }
        }

        info!(channel = %self.channel, "Notification relay stopped");
    }
}

/// Sleep for `delay`; returns true if shutdown was signalled meanwhile
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
