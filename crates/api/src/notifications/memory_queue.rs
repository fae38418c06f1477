//! In-process notification queue

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{NotificationEvent, NotificationQueue, QueueError, QueuedEvent};

#[derive(Default)]
struct Channel {
    ready: VecDeque<String>,
    in_flight: Vec<String>,
}

/// Queue held in process memory. Events survive consumer restarts within the
/// process but not a process restart.
pub struct MemoryQueue {
    channels: Mutex<HashMap<String, Channel>>,
    available: AtomicBool,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    /// Simulate the broker going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            self.notify.notify_waiters();
        }
    }

    pub fn ready_len(&self, channel: &str) -> usize {
        self.with_channel(channel, |c| c.ready.len())
    }

    pub fn in_flight_len(&self, channel: &str) -> usize {
        self.with_channel(channel, |c| c.in_flight.len())
    }

    fn check(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable("in-process broker offline".to_string()))
        }
    }

    fn with_channel<T>(&self, channel: &str, f: impl FnOnce(&mut Channel) -> T) -> T {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(channels.entry(channel.to_string()).or_default())
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    async fn enqueue(&self, channel: &str, event: &NotificationEvent) -> Result<(), QueueError> {
        self.check()?;
        let queued = QueuedEvent::encode(event)?;
        self.with_channel(channel, |c| c.ready.push_back(queued.raw));
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(
        &self,
        channel: &str,
        timeout: Duration,
    ) -> Result<Option<QueuedEvent>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            self.check()?;

            let next = self.with_channel(channel, |c| {
                c.ready.pop_front().inspect(|raw| c.in_flight.push(raw.clone()))
            });
            if let Some(raw) = next {
                return Ok(Some(QueuedEvent { raw }));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, channel: &str, event: &QueuedEvent) -> Result<(), QueueError> {
        self.check()?;
        self.with_channel(channel, |c| {
            if let Some(pos) = c.in_flight.iter().position(|raw| *raw == event.raw) {
                c.in_flight.remove(pos);
            }
        });
        Ok(())
    }

    async fn requeue(&self, channel: &str, event: &QueuedEvent) -> Result<(), QueueError> {
        self.check()?;
        self.with_channel(channel, |c| {
            if let Some(pos) = c.in_flight.iter().position(|raw| *raw == event.raw) {
                c.in_flight.remove(pos);
            }
            c.ready.push_front(event.raw.clone());
        });
        self.notify.notify_one();
        Ok(())
    }

    async fn recover(&self, channel: &str) -> Result<usize, QueueError> {
        self.check()?;
        let moved = self.with_channel(channel, |c| {
            let moved = c.in_flight.len();
            for raw in c.in_flight.drain(..).rev() {
                c.ready.push_front(raw);
            }
            moved
        });
        if moved > 0 {
            self.notify.notify_one();
        }
        Ok(moved)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check()
    }
}
