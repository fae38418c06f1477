//! Routing of inbound client events
//!
//! Each event resolves its target, calls the owning service and hands the
//! resulting deliveries to the gateway. Failures go back to the calling
//! connection only, as an `error` event.

use std::sync::Arc;
use tourline_shared::{ChatError, ChatResult, Conversation, SupportTicket};
use uuid::Uuid;

use super::connection::Connection;
use super::events::{ClientEvent, ServerEvent};
use super::room::RoomKey;
use crate::chat::{ChatService, SendMessage};
use crate::state::AppState;
use crate::support::SupportService;

/// A room id names either a conversation or a support ticket
enum Target {
    Conversation(Conversation),
    Ticket(SupportTicket),
}

async fn resolve(state: &AppState, id: Uuid) -> ChatResult<Target> {
    if let Some(conversation) = state.chat.find(id).await? {
        return Ok(Target::Conversation(conversation));
    }
    match state.support.find(id).await? {
        Some(ticket) => Ok(Target::Ticket(ticket)),
        None => Err(ChatError::not_found("Conversation not found")),
    }
}

/// The room this connection has joined for `id`, if any
async fn joined_room(conn: &Connection, id: Uuid) -> Option<RoomKey> {
    for room in [RoomKey::Conversation(id), RoomKey::Support(id)] {
        if conn.is_member(&room).await {
            return Some(room);
        }
    }
    None
}

pub async fn handle_client_event(state: &AppState, conn: &Arc<Connection>, event: ClientEvent) {
    let event_type = event.kind();
    if let Err(err) = dispatch(state, conn, event).await {
        match &err {
            ChatError::Store(e) => tracing::error!(
                session_id = %conn.session_id,
                event = event_type,
                error = %e,
                "Client event failed"
            ),
            other => tracing::debug!(
                session_id = %conn.session_id,
                event = event_type,
                code = other.code(),
                "Client event rejected"
            ),
        }
        let _ = conn.send(ServerEvent::error(&err));
    }
}

async fn dispatch(state: &AppState, conn: &Arc<Connection>, event: ClientEvent) -> ChatResult<()> {
    let identity = conn.identity;

    match event {
        ClientEvent::JoinRoom { conversation_id } => join_room(state, conn, conversation_id).await,

        ClientEvent::LeaveRoom { conversation_id } => {
            if let Some(room) = joined_room(conn, conversation_id).await {
                state.gateway.rooms.leave(&room, conn).await;
            }
            let _ = conn.send(ServerEvent::RoomLeft { conversation_id });
            Ok(())
        }

        ClientEvent::SendMessage {
            conversation_id,
            content,
            kind,
            reply_to,
        } => {
            let deliveries = match resolve(state, conversation_id).await? {
                Target::Conversation(_) => {
                    let input = SendMessage {
                        content,
                        kind,
                        reply_to,
                    };
                    state
                        .chat
                        .send_message(conversation_id, identity.user_id, input)
                        .await?
                        .deliveries
                }
                Target::Ticket(_) => {
                    state
                        .support
                        .send(&identity, conversation_id, &content, reply_to)
                        .await?
                        .deliveries
                }
            };
            state.gateway.deliver(deliveries).await;
            Ok(())
        }

        ClientEvent::MarkAsRead { conversation_id } => {
            let deliveries = match resolve(state, conversation_id).await? {
                Target::Conversation(_) => {
                    state
                        .chat
                        .mark_as_read(conversation_id, identity.user_id)
                        .await?
                        .deliveries
                }
                Target::Ticket(_) => {
                    state
                        .support
                        .mark_read(&identity, conversation_id)
                        .await?
                        .deliveries
                }
            };
            state.gateway.deliver(deliveries).await;
            Ok(())
        }

        ClientEvent::TypingStart { conversation_id } => {
            typing(state, conn, conversation_id, true).await
        }
        ClientEvent::TypingStop { conversation_id } => {
            typing(state, conn, conversation_id, false).await
        }

        ClientEvent::React {
            message_id,
            reaction,
        } => {
            let outcome = state
                .chat
                .react(message_id, identity.user_id, reaction)
                .await?;
            state.gateway.deliver(outcome.deliveries).await;
            Ok(())
        }

        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
            Ok(())
        }
    }
}

async fn join_room(state: &AppState, conn: &Arc<Connection>, conversation_id: Uuid) -> ChatResult<()> {
    let identity = conn.identity;
    let resolved = match resolve(state, conversation_id).await {
        Ok(target) => Some(target),
        Err(ChatError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    let room = match resolved {
        Some(Target::Conversation(c)) if ChatService::can_access(&c, identity.user_id) => {
            Some(RoomKey::Conversation(conversation_id))
        }
        Some(Target::Ticket(t)) if SupportService::can_access(&t, &identity) => {
            Some(RoomKey::Support(conversation_id))
        }
        _ => None,
    };

    match room {
        Some(room) => {
            state.gateway.rooms.join(room, Arc::clone(conn)).await;
            let _ = conn.send(ServerEvent::RoomJoined { conversation_id });
        }
        None => {
            tracing::warn!(
                session_id = %conn.session_id,
                user_id = %identity.user_id,
                conversation_id = %conversation_id,
                "Room join denied"
            );
            let _ = conn.send(ServerEvent::AccessDenied {
                conversation_id,
                message: "You do not have access to this conversation".to_string(),
            });
        }
    }
    Ok(())
}

/// Typing indicators go to the other members of a room the caller has joined
async fn typing(
    state: &AppState,
    conn: &Arc<Connection>,
    conversation_id: Uuid,
    is_typing: bool,
) -> ChatResult<()> {
    let room = joined_room(conn, conversation_id)
        .await
        .ok_or_else(|| ChatError::access_denied("Join the conversation before typing"))?;

    let event = ServerEvent::UserTyping {
        conversation_id,
        user_id: conn.user_id(),
        is_typing,
    };
    state
        .gateway
        .rooms
        .broadcast_except(&room, Some(conn.session_id), &event)
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notifications::MemoryQueue;
    use crate::support::CreateTicket;
    use tokio::sync::mpsc;
    use tourline_shared::Identity;

    fn state() -> AppState {
        AppState::in_memory(
            Config::local("test-secret-key-at-least-32-chars!"),
            Arc::new(MemoryQueue::new()),
        )
    }

    async fn connect(
        state: &AppState,
        identity: Identity,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (state.gateway.register(identity, tx).await, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_join_send_and_typing() {
        let state = state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = state.chat.start_private(a, b).await.unwrap();
        let (conn_a, mut rx_a) = connect(&state, Identity::user(a)).await;
        let (conn_b, mut rx_b) = connect(&state, Identity::user(b)).await;

        for conn in [&conn_a, &conn_b] {
            handle_client_event(&state, conn, ClientEvent::JoinRoom { conversation_id: conv.id })
                .await;
        }
        assert!(matches!(drain(&mut rx_a)[..], [ServerEvent::RoomJoined { .. }]));
        drain(&mut rx_b);

        handle_client_event(
            &state,
            &conn_a,
            ClientEvent::TypingStart { conversation_id: conv.id },
        )
        .await;
        assert!(drain(&mut rx_a).is_empty());
        assert!(matches!(
            drain(&mut rx_b)[..],
            [ServerEvent::UserTyping { is_typing: true, .. }]
        ));

        handle_client_event(
            &state,
            &conn_a,
            ClientEvent::SendMessage {
                conversation_id: conv.id,
                content: "see you at the pier".into(),
                kind: Default::default(),
                reply_to: None,
            },
        )
        .await;

        // Sender sees the message once; recipient gets it plus an inbox update
        let to_a = drain(&mut rx_a);
        assert_eq!(to_a.len(), 1);
        let to_b = drain(&mut rx_b);
        assert!(matches!(
            to_b[..],
            [ServerEvent::NewMessage { .. }, ServerEvent::ConversationUpdated { unread_count: 1, .. }]
        ));
    }

    #[tokio::test]
    async fn test_outsider_join_is_denied() {
        let state = state();
        let conv = state
            .chat
            .start_private(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        let (outsider, mut rx) = connect(&state, Identity::user(Uuid::new_v4())).await;

        handle_client_event(&state, &outsider, ClientEvent::JoinRoom { conversation_id: conv.id })
            .await;
        assert!(matches!(drain(&mut rx)[..], [ServerEvent::AccessDenied { .. }]));
        assert!(!outsider.is_member(&RoomKey::Conversation(conv.id)).await);

        handle_client_event(
            &state,
            &outsider,
            ClientEvent::JoinRoom {
                conversation_id: Uuid::new_v4(),
            },
        )
        .await;
        assert!(matches!(drain(&mut rx)[..], [ServerEvent::AccessDenied { .. }]));
    }

    #[tokio::test]
    async fn test_errors_reach_only_the_caller() {
        let state = state();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = state.chat.start_private(a, b).await.unwrap();
        let (conn_a, mut rx_a) = connect(&state, Identity::user(a)).await;
        let (_conn_b, mut rx_b) = connect(&state, Identity::user(b)).await;

        handle_client_event(
            &state,
            &conn_a,
            ClientEvent::SendMessage {
                conversation_id: conv.id,
                content: "   ".into(),
                kind: Default::default(),
                reply_to: None,
            },
        )
        .await;

        match &drain(&mut rx_a)[..] {
            [ServerEvent::Error { code, .. }] => assert_eq!(code, "VALIDATION_ERROR"),
            other => panic!("unexpected events: {:?}", other),
        }
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_support_room_follows_ticket_parties() {
        let state = state();
        let user = Identity::user(Uuid::new_v4());
        let staff = Identity::staff(Uuid::new_v4());
        let ticket = state
            .support
            .create(
                &user,
                CreateTicket {
                    subject: "Boat tour".into(),
                    description: "Where do we meet?".into(),
                },
            )
            .await
            .unwrap()
            .value;

        let (conn_staff, mut rx_staff) = connect(&state, staff).await;
        handle_client_event(&state, &conn_staff, ClientEvent::JoinRoom { conversation_id: ticket.id })
            .await;
        assert!(matches!(drain(&mut rx_staff)[..], [ServerEvent::AccessDenied { .. }]));

        let joined = state.support.join(&staff, ticket.id).await.unwrap();
        state.gateway.deliver(joined.deliveries).await;
        drain(&mut rx_staff);

        handle_client_event(&state, &conn_staff, ClientEvent::JoinRoom { conversation_id: ticket.id })
            .await;
        assert!(matches!(drain(&mut rx_staff)[..], [ServerEvent::RoomJoined { .. }]));

        handle_client_event(&state, &conn_staff, ClientEvent::Ping).await;
        assert!(matches!(drain(&mut rx_staff)[..], [ServerEvent::Pong]));
    }
}
