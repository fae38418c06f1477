//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization.

use serde::{Deserialize, Serialize};
use tourline_shared::{
    ChatError, LastMessage, Message, MessageKind, Role, SupportMessage, SupportTicket,
};
use uuid::Uuid;

use super::room::RoomKey;
use crate::notifications::NotificationEvent;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server.
///
/// `conversation_id` names either a conversation or a support ticket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom {
        conversation_id: Uuid,
    },

    LeaveRoom {
        conversation_id: Uuid,
    },

    SendMessage {
        conversation_id: Uuid,
        content: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default)]
        reply_to: Option<Uuid>,
    },

    MarkAsRead {
        conversation_id: Uuid,
    },

    TypingStart {
        conversation_id: Uuid,
    },

    TypingStop {
        conversation_id: Uuid,
    },

    /// Set (or clear, when `reaction` is absent) the caller's reaction
    React {
        message_id: Uuid,
        #[serde(default)]
        reaction: Option<String>,
    },

    /// Heartbeat ping to keep connection alive
    Ping,
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::LeaveRoom { .. } => "leave-room",
            ClientEvent::SendMessage { .. } => "send-message",
            ClientEvent::MarkAsRead { .. } => "mark-as-read",
            ClientEvent::TypingStart { .. } => "typing-start",
            ClientEvent::TypingStop { .. } => "typing-stop",
            ClientEvent::React { .. } => "react",
            ClientEvent::Ping => "ping",
        }
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Either kind of stored message
#[derive(Debug, Serialize, Clone)]
#[serde(untagged)]
pub enum MessagePayload {
    Chat(Message),
    Support(SupportMessage),
}

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected {
        session_id: Uuid,
        user_id: Uuid,
        role: Role,
    },

    NewMessage {
        conversation_id: Uuid,
        message: MessagePayload,
    },

    /// Inbox summary for one recipient
    ConversationUpdated {
        conversation_id: Uuid,
        last_message: Option<LastMessage>,
        unread_count: u32,
    },

    /// Edit or reaction change
    MessageUpdated {
        conversation_id: Uuid,
        message: Message,
    },

    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
        message_ids: Vec<Uuid>,
    },

    RoomJoined {
        conversation_id: Uuid,
    },

    RoomLeft {
        conversation_id: Uuid,
    },

    AccessDenied {
        conversation_id: Uuid,
        message: String,
    },

    TicketUpdated {
        ticket: SupportTicket,
    },

    StaffNotification {
        notification: NotificationEvent,
    },

    /// Heartbeat response
    Pong,

    /// Operation failure, sent only to the caller
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &ChatError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.client_message(),
        }
    }

    /// Wire name of the event, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::NewMessage { .. } => "new-message",
            ServerEvent::ConversationUpdated { .. } => "conversation-updated",
            ServerEvent::MessageUpdated { .. } => "message-updated",
            ServerEvent::UserTyping { .. } => "user-typing",
            ServerEvent::MessagesRead { .. } => "messages-read",
            ServerEvent::RoomJoined { .. } => "room-joined",
            ServerEvent::RoomLeft { .. } => "room-left",
            ServerEvent::AccessDenied { .. } => "access-denied",
            ServerEvent::TicketUpdated { .. } => "ticket-updated",
            ServerEvent::StaffNotification { .. } => "staff-notification",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// An outbound event addressed to a room, produced by services and applied
/// by the gateway
#[derive(Debug, Clone)]
pub struct Delivery {
    pub room: RoomKey,
    pub event: ServerEvent,
}

impl Delivery {
    pub fn to(room: RoomKey, event: ServerEvent) -> Self {
        Self { room, event }
    }
}

/// Result of a service operation plus the events it fans out
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub deliveries: Vec<Delivery>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, deliveries: Vec<Delivery>) -> Self {
        Self { value, deliveries }
    }

    pub fn quiet(value: T) -> Self {
        Self {
            value,
            deliveries: Vec::new(),
        }
    }
}
