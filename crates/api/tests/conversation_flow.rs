//! Integration tests for messaging and unread accounting
//!
//! ## Test Coverage
//! - Concurrent sends keep per-recipient unread counts exact
//! - Reads racing sends never leave a counter out of step with `seen_by`
//! - The last-message cache never moves backwards
//! - Mark-as-read is idempotent and history reads never mark anything
//! - Per-user delete hides entities for the requester only
//! - One reaction per user per message
//! - Room delivery reaches each connection once, offline users reconcile via history

use std::sync::Arc;
use tokio::sync::mpsc;
use tourline_api::{
    chat::SendMessage,
    notifications::MemoryQueue,
    websocket::{
        events::{ClientEvent, ServerEvent},
        handle_client_event, RoomKey,
    },
    AppState, Config,
};
use tourline_shared::{ChatError, Identity, MessageKind};
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

fn app_state() -> AppState {
    AppState::in_memory(
        Config::local("integration-secret-key-with-32-chars"),
        Arc::new(MemoryQueue::new()),
    )
}

fn text(content: &str) -> SendMessage {
    SendMessage {
        content: content.to_string(),
        kind: MessageKind::Text,
        reply_to: None,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Unread accounting
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_keep_unread_exact() {
    let state = app_state();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv_id = state.chat.start_private(a, b).await.unwrap().id;

    let mut handles = Vec::new();
    for i in 0..40 {
        let chat = state.chat.clone();
        let sender = if i % 4 == 0 { b } else { a };
        handles.push(tokio::spawn(async move {
            chat.send_message(conv_id, sender, text(&format!("msg {}", i)))
                .await
                .map(|outcome| outcome.value)
        }));
    }

    let mut sent = Vec::new();
    for handle in handles {
        sent.push(handle.await.unwrap().unwrap());
    }

    let conv = state.chat.get(conv_id, a).await.unwrap();
    assert_eq!(conv.unread_counts.get(&b), 30);
    assert_eq!(conv.unread_counts.get(&a), 10);

    let newest = sent.iter().max_by_key(|m| m.seq).unwrap();
    assert_eq!(conv.last_message.unwrap().message_id, newest.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_racing_sends_match_seen_by() {
    let state = app_state();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv_id = state.chat.start_private(a, b).await.unwrap().id;

    let mut handles = Vec::new();
    for i in 0..30 {
        let chat = state.chat.clone();
        handles.push(tokio::spawn(async move {
            chat.send_message(conv_id, a, text(&format!("msg {}", i)))
                .await
                .map(|_| ())
        }));
        if i % 3 == 0 {
            let chat = state.chat.clone();
            handles.push(tokio::spawn(async move {
                chat.mark_as_read(conv_id, b).await.map(|_| ())
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Every message b has not seen is counted, and nothing else
    let unseen = state
        .chat
        .history(conv_id, b, Some(1), Some(100))
        .await
        .unwrap()
        .messages
        .iter()
        .filter(|m| !m.message.seen_by.contains(&b))
        .count();
    let conv = state.chat.get(conv_id, b).await.unwrap();
    assert_eq!(conv.unread_counts.get(&b) as usize, unseen);
    assert_eq!(conv.unread_counts.get(&a), 0);

    state.chat.mark_as_read(conv_id, b).await.unwrap();
    assert_eq!(state.chat.get(conv_id, b).await.unwrap().unread_counts.get(&b), 0);
}

#[tokio::test]
async fn test_two_senders_each_see_one_unread() {
    let state = app_state();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv_id = state.chat.start_private(a, b).await.unwrap().id;

    let (from_a, from_b) = tokio::join!(
        state.chat.send_message(conv_id, a, text("from a")),
        state.chat.send_message(conv_id, b, text("from b")),
    );
    from_a.unwrap();
    from_b.unwrap();

    let conv = state.chat.get(conv_id, a).await.unwrap();
    assert_eq!(conv.unread_counts.get(&a), 1);
    assert_eq!(conv.unread_counts.get(&b), 1);
    assert_eq!(
        state.chat.history(conv_id, a, None, None).await.unwrap().messages.len(),
        2
    );
}

#[tokio::test]
async fn test_group_unread_skips_sender_and_departed() {
    let state = app_state();
    let (owner, stays, leaves) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let group = state
        .chat
        .create_group(
            owner,
            tourline_api::chat::CreateGroup {
                name: "Sunrise hike".into(),
                avatar: None,
                participants: vec![stays, leaves],
            },
        )
        .await
        .unwrap()
        .value;

    state.chat.leave(group.id, leaves).await.unwrap();
    state.chat.send_message(group.id, owner, text("meet at 5")).await.unwrap();

    let group = state.chat.get(group.id, leaves).await.unwrap();
    assert_eq!(group.unread_counts.get(&owner), 0);
    assert_eq!(group.unread_counts.get(&stays), 1);
    assert_eq!(group.unread_counts.get(&leaves), 0);

    // Former participants keep read access to history but cannot write
    assert_eq!(
        state.chat.history(group.id, leaves, None, None).await.unwrap().messages.len(),
        1
    );
    assert!(matches!(
        state.chat.send_message(group.id, leaves, text("wait for me")).await,
        Err(ChatError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_read_is_idempotent_and_history_is_passive() {
    let state = app_state();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = state.chat.start_private(a, b).await.unwrap();
    for i in 0..3 {
        state.chat.send_message(conv.id, a, text(&format!("{}", i))).await.unwrap();
    }

    for _ in 0..3 {
        state.chat.history(conv.id, b, Some(1), Some(10)).await.unwrap();
    }
    assert_eq!(state.chat.get(conv.id, b).await.unwrap().unread_counts.get(&b), 3);

    let first = state.chat.mark_as_read(conv.id, b).await.unwrap().value;
    let second = state.chat.mark_as_read(conv.id, b).await.unwrap().value;
    assert_eq!(first.len(), 3);
    assert!(second.is_empty());

    let history = state.chat.history(conv.id, a, None, None).await.unwrap();
    assert!(history
        .messages
        .iter()
        .all(|m| m.message.seen_by.contains(&a) && m.message.seen_by.contains(&b)));
}

// ============================================================================
// Per-user visibility and reactions
// ============================================================================

#[tokio::test]
async fn test_soft_delete_is_per_user() {
    let state = app_state();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = state.chat.start_private(a, b).await.unwrap();
    let keep = state.chat.send_message(conv.id, a, text("keep")).await.unwrap().value;
    let hide = state.chat.send_message(conv.id, a, text("hide")).await.unwrap().value;

    state.chat.delete_message(hide.id, b).await.unwrap();

    let for_b: Vec<Uuid> = state
        .chat
        .history(conv.id, b, None, None)
        .await
        .unwrap()
        .messages
        .into_iter()
        .map(|m| m.message.id)
        .collect();
    assert_eq!(for_b, vec![keep.id]);
    assert_eq!(state.chat.history(conv.id, a, None, None).await.unwrap().messages.len(), 2);

    // Reacting to a message hidden from the caller is not possible
    assert!(matches!(
        state.chat.react(hide.id, b, Some("like".into())).await,
        Err(ChatError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reactions_leave_one_per_user() {
    let state = app_state();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = state.chat.start_private(a, b).await.unwrap();
    let msg_id = state.chat.send_message(conv.id, a, text("photo")).await.unwrap().value.id;

    let mut handles = Vec::new();
    for reaction in ["like", "love", "wow", "haha", "like", "sad"] {
        let chat = state.chat.clone();
        handles.push(tokio::spawn(async move {
            chat.react(msg_id, b, Some(reaction.to_string())).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = state.chat.history(conv.id, a, None, None).await.unwrap();
    let reactions = &history.messages[0].message.reactions;
    assert_eq!(reactions.iter().filter(|r| r.user_id == b).count(), 1);
}

// ============================================================================
// Gateway delivery
// ============================================================================

#[tokio::test]
async fn test_room_broadcast_reaches_each_connection_once() {
    let state = app_state();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = state.chat.start_private(a, b).await.unwrap();

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b1, mut rx_b1) = mpsc::unbounded_channel();
    let (tx_b2, mut rx_b2) = mpsc::unbounded_channel();
    let conn_a = state.gateway.register(Identity::user(a), tx_a).await;
    let conn_b1 = state.gateway.register(Identity::user(b), tx_b1).await;
    let _conn_b2 = state.gateway.register(Identity::user(b), tx_b2).await;

    // Joining twice still makes one membership
    for _ in 0..2 {
        handle_client_event(&state, &conn_b1, ClientEvent::JoinRoom { conversation_id: conv.id })
            .await;
    }
    handle_client_event(&state, &conn_a, ClientEvent::JoinRoom { conversation_id: conv.id })
        .await;
    assert_eq!(
        state.gateway.rooms.room_size(&RoomKey::Conversation(conv.id)).await,
        2
    );
    drain(&mut rx_a);
    drain(&mut rx_b1);

    let outcome = state.chat.send_message(conv.id, a, text("boarding now")).await.unwrap();
    state.gateway.deliver(outcome.deliveries).await;

    let b1 = drain(&mut rx_b1);
    let new_messages = b1
        .iter()
        .filter(|e| matches!(e, ServerEvent::NewMessage { .. }))
        .count();
    assert_eq!(new_messages, 1);

    // The second device never joined the room: only the inbox badge update
    assert!(matches!(
        drain(&mut rx_b2)[..],
        [ServerEvent::ConversationUpdated { unread_count: 1, .. }]
    ));

    // After disconnect the user reconciles by fetching history
    state.gateway.unregister(&conn_b1.session_id).await;
    let outcome = state.chat.send_message(conv.id, a, text("doors closing")).await.unwrap();
    state.gateway.deliver(outcome.deliveries).await;
    assert!(rx_b1.try_recv().is_err());
    assert_eq!(state.chat.history(conv.id, b, None, None).await.unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_leaving_group_evicts_from_room() {
    let state = app_state();
    let (owner, member) = (Uuid::new_v4(), Uuid::new_v4());
    let group = state
        .chat
        .create_group(
            owner,
            tourline_api::chat::CreateGroup {
                name: "Kayak crew".into(),
                avatar: None,
                participants: vec![member],
            },
        )
        .await
        .unwrap()
        .value;

    let (tx, _rx) = mpsc::unbounded_channel();
    let conn = state.gateway.register(Identity::user(member), tx).await;
    handle_client_event(&state, &conn, ClientEvent::JoinRoom { conversation_id: group.id }).await;
    assert!(conn.is_member(&RoomKey::Conversation(group.id)).await);

    state.chat.leave(group.id, member).await.unwrap();
    let evicted = state
        .gateway
        .evict_user(&RoomKey::Conversation(group.id), &member)
        .await;
    assert_eq!(evicted, 1);
    assert!(!conn.is_member(&RoomKey::Conversation(group.id)).await);
}
