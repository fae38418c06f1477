//! Integration tests for the staff notification bridge
//!
//! ## Test Coverage
//! - Producers succeed while the broker is down
//! - Events reach connected staff once the relay consumer runs
//! - A failed relay requeues the event instead of losing it
//! - The consumer recovers from an outage and stops on shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tourline_api::{
    notifications::{
        broker_backoff, MemoryQueue, NotificationEvent, NotificationQueue, RelayConsumer,
    },
    support::CreateTicket,
    websocket::events::ServerEvent,
    AppState, Config,
};
use tourline_shared::Identity;
use uuid::Uuid;

const CHANNEL: &str = "staff-notifications";

fn app_state(queue: Arc<MemoryQueue>) -> AppState {
    AppState::in_memory(Config::local("integration-secret-key-with-32-chars"), queue)
}

fn consumer(queue: Arc<MemoryQueue>, state: &AppState) -> RelayConsumer {
    RelayConsumer::new(
        queue,
        Arc::new(state.gateway.clone()),
        CHANNEL,
        broker_backoff(Duration::from_millis(4), Duration::from_millis(20)),
    )
    .with_poll_timeout(Duration::from_millis(20))
}

async fn next_notification(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> NotificationEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for staff notification")
            .expect("connection channel closed");
        if let ServerEvent::StaffNotification { notification } = event {
            return notification;
        }
    }
}

#[tokio::test]
async fn test_ticket_creation_survives_broker_outage_and_is_relayed_later() {
    let queue = Arc::new(MemoryQueue::new());
    let state = app_state(queue.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.gateway.register(Identity::staff(Uuid::new_v4()), tx).await;

    // Broker down: the user request still succeeds, the event is dropped
    queue.set_available(false);
    let user = Identity::user(Uuid::new_v4());
    let first = state
        .support
        .create(
            &user,
            CreateTicket {
                subject: "Transfer".into(),
                description: "Airport pickup missing".into(),
            },
        )
        .await;
    assert!(first.is_ok());
    assert_eq!(queue.ready_len(CHANNEL), 0);

    // Broker back: the next producer event is queued and relayed
    queue.set_available(true);
    let other = Identity::user(Uuid::new_v4());
    let ticket = state
        .support
        .create(
            &other,
            CreateTicket {
                subject: "Vouchers".into(),
                description: "Which voucher do I show?".into(),
            },
        )
        .await
        .unwrap()
        .value;
    assert_eq!(queue.ready_len(CHANNEL), 1);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(consumer(queue.clone(), &state).run(shutdown_rx));

    let notification = next_notification(&mut rx).await;
    assert_eq!(notification.category, "support_request");
    assert_eq!(notification.data["ticket_id"], ticket.id.to_string());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queue.in_flight_len(CHANNEL), 0);
}

#[tokio::test]
async fn test_relay_failure_requeues_until_gateway_accepts() {
    let queue = Arc::new(MemoryQueue::new());
    let state = app_state(queue.clone());

    let event = NotificationEvent::new("booking_cancelled", "Booking cancelled", "Tour 42", serde_json::Value::Null);
    queue.enqueue(CHANNEL, &event).await.unwrap();

    // A closed gateway refuses relays; the event must stay queued
    let closed = app_state(queue.clone());
    closed.gateway.close();
    let mut failing = RelayConsumer::new(
        queue.clone(),
        Arc::new(closed.gateway.clone()),
        CHANNEL,
        broker_backoff(Duration::from_millis(4), Duration::from_millis(20)),
    )
    .with_poll_timeout(Duration::from_millis(20));
    failing.step().await.unwrap();
    assert_eq!(queue.ready_len(CHANNEL), 1);
    assert_eq!(queue.in_flight_len(CHANNEL), 0);

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.gateway.register(Identity::staff(Uuid::new_v4()), tx).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(consumer(queue.clone(), &state).run(shutdown_rx));

    let relayed = next_notification(&mut rx).await;
    assert_eq!(relayed.id, event.id);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_consumer_waits_out_broker_outage() {
    let queue = Arc::new(MemoryQueue::new());
    let state = app_state(queue.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.gateway.register(Identity::staff(Uuid::new_v4()), tx).await;

    queue.set_available(false);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(consumer(queue.clone(), &state).run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.set_available(true);
    let event = NotificationEvent::new("payment_failed", "Payment failed", "Booking 7", serde_json::Value::Null);
    queue.enqueue(CHANNEL, &event).await.unwrap();

    assert_eq!(next_notification(&mut rx).await.id, event.id);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}
