//! WebSocket connection management
//!
//! Represents an authenticated connection and the rooms it belongs to.

use std::collections::HashSet;
use tokio::sync::{mpsc, RwLock};
use tourline_shared::Identity;
use uuid::Uuid;

use super::events::ServerEvent;
use super::room::RoomKey;

/// An active real-time connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    pub identity: Identity,

    /// Channel drained by the socket writer task
    sender: mpsc::UnboundedSender<ServerEvent>,

    /// Rooms this connection is a member of, mirrored from the room manager
    rooms: RwLock<HashSet<RoomKey>>,
}

impl Connection {
    pub fn new(identity: Identity, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            identity,
            sender,
            rooms: RwLock::new(HashSet::new()),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.identity.user_id
    }

    /// Queue an event for this connection. Returns false if the socket is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub(super) async fn track_join(&self, room: RoomKey) -> bool {
        self.rooms.write().await.insert(room)
    }

    pub(super) async fn track_leave(&self, room: &RoomKey) -> bool {
        self.rooms.write().await.remove(room)
    }

    pub async fn is_member(&self, room: &RoomKey) -> bool {
        self.rooms.read().await.contains(room)
    }

    pub async fn rooms(&self) -> HashSet<RoomKey> {
        self.rooms.read().await.clone()
    }
}
