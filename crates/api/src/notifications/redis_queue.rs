//! Redis-backed notification queue
//!
//! Each channel is a list. Producers `LPUSH`; the consumer `BLMOVE`s from the
//! right into `<channel>:processing`, `LREM`s on ack and moves the payload
//! back atomically on requeue. Anything left in the processing list by a
//! crashed consumer is moved back by [`recover`](NotificationQueue::recover).

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::{NotificationEvent, NotificationQueue, QueueError, QueuedEvent};

fn processing_key(channel: &str) -> String {
    format!("{}:processing", channel)
}

/// Lazily (re)established connection with a single-flight connect guard.
///
/// While one task is connecting, other callers fail fast instead of piling
/// up behind it, so producers never wait on a broker outage.
struct ConnectionSlot {
    name: &'static str,
    conn: RwLock<Option<MultiplexedConnection>>,
    connecting: Mutex<()>,
}

impl ConnectionSlot {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            conn: RwLock::new(None),
            connecting: Mutex::new(()),
        }
    }

    async fn get(&self, client: &redis::Client) -> Result<MultiplexedConnection, QueueError> {
        if let Some(conn) = self.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let Ok(_guard) = self.connecting.try_lock() else {
            return Err(QueueError::Unavailable(format!(
                "{} connection is being re-established",
                self.name
            )));
        };

        // Another task may have finished connecting while we waited for the guard
        if let Some(conn) = self.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!(connection = self.name, "Connected to notification broker");
        *self.conn.write().await = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection after an I/O failure so the next call reconnects
    async fn invalidate(&self, err: &redis::RedisError) {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            let mut slot = self.conn.write().await;
            if slot.take().is_some() {
                tracing::warn!(connection = self.name, error = %err, "Broker connection lost");
            }
        }
    }
}

pub struct RedisQueue {
    client: redis::Client,
    /// Shared connection for non-blocking commands
    commands: ConnectionSlot,
    /// Dedicated connection for BLMOVE so it never stalls producers
    blocking: ConnectionSlot,
}

impl RedisQueue {
    /// Build the queue without connecting; connections are made on first use
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            commands: ConnectionSlot::new("commands"),
            blocking: ConnectionSlot::new("blocking"),
        })
    }

    async fn run<T, F, Fut>(&self, slot: &ConnectionSlot, op: F) -> Result<T, QueueError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let conn = slot.get(&self.client).await?;
        match op(conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                slot.invalidate(&e).await;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl NotificationQueue for RedisQueue {
    async fn enqueue(&self, channel: &str, event: &NotificationEvent) -> Result<(), QueueError> {
        let queued = QueuedEvent::encode(event)?;
        self.run(&self.commands, |mut conn| async move {
            let _: i64 = redis::cmd("LPUSH")
                .arg(channel)
                .arg(&queued.raw)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn dequeue(
        &self,
        channel: &str,
        timeout: Duration,
    ) -> Result<Option<QueuedEvent>, QueueError> {
        let processing = processing_key(channel);
        let raw: Option<String> = self
            .run(&self.blocking, |mut conn| async move {
                redis::cmd("BLMOVE")
                    .arg(channel)
                    .arg(&processing)
                    .arg("RIGHT")
                    .arg("LEFT")
                    .arg(timeout.as_secs_f64())
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(raw.map(|raw| QueuedEvent { raw }))
    }

    async fn ack(&self, channel: &str, event: &QueuedEvent) -> Result<(), QueueError> {
        let processing = processing_key(channel);
        self.run(&self.commands, |mut conn| async move {
            let _: i64 = redis::cmd("LREM")
                .arg(&processing)
                .arg(1)
                .arg(&event.raw)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn requeue(&self, channel: &str, event: &QueuedEvent) -> Result<(), QueueError> {
        let processing = processing_key(channel);
        self.run(&self.commands, |mut conn| async move {
            // RPUSH lands on the consuming end, so the event is retried next
            let _: () = redis::pipe()
                .atomic()
                .cmd("LREM")
                .arg(&processing)
                .arg(1)
                .arg(&event.raw)
                .ignore()
                .cmd("RPUSH")
                .arg(channel)
                .arg(&event.raw)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn recover(&self, channel: &str) -> Result<usize, QueueError> {
        let processing = processing_key(channel);
        self.run(&self.commands, |mut conn| async move {
            let mut moved = 0usize;
            // Newest in-flight first, each pushed onto the consuming end, so
            // the oldest ends up consumed first
            loop {
                let raw: Option<String> = redis::cmd("LMOVE")
                    .arg(&processing)
                    .arg(channel)
                    .arg("LEFT")
                    .arg("RIGHT")
                    .query_async(&mut conn)
                    .await?;
                if raw.is_none() {
                    break;
                }
                moved += 1;
            }
            Ok(moved)
        })
        .await
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.run(&self.commands, |mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_key() {
        assert_eq!(processing_key("staff-notifications"), "staff-notifications:processing");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisQueue::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_unavailable() {
        // Port 1 on localhost refuses connections
        let queue = RedisQueue::new("redis://127.0.0.1:1").unwrap();
        assert!(matches!(queue.ping().await, Err(QueueError::Unavailable(_))));
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis at REDIS_URL
    async fn test_round_trip_against_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let queue = RedisQueue::new(&url).unwrap();
        let channel = format!("test-{}", uuid::Uuid::new_v4());
        let event = NotificationEvent::new("test", "t", "m", serde_json::Value::Null);

        queue.enqueue(&channel, &event).await.unwrap();
        let got = queue
            .dequeue(&channel, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.decode().unwrap(), event);
        queue.requeue(&channel, &got).await.unwrap();
        let again = queue
            .dequeue(&channel, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        queue.ack(&channel, &again).await.unwrap();
        assert_eq!(queue.recover(&channel).await.unwrap(), 0);
    }
}
