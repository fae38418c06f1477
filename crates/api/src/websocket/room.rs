//! Room management for pub/sub
//!
//! Rooms are keyed by [`RoomKey`] and hold connections by session id, so a
//! connection that joins a room twice is still a single member and receives
//! each broadcast exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

/// Logical delivery group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// Per-user inbox for list/badge updates
    Inbox(Uuid),
    /// Members viewing a private or group conversation
    Conversation(Uuid),
    /// Owner and assigned staff viewing a support ticket
    Support(Uuid),
    /// Every connected staff member
    Staff,
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Inbox(id) => write!(f, "inbox:{}", id),
            RoomKey::Conversation(id) => write!(f, "conversation:{}", id),
            RoomKey::Support(id) => write!(f, "support:{}", id),
            RoomKey::Staff => write!(f, "staff"),
        }
    }
}

type Members = HashMap<Uuid, Arc<Connection>>;

pub struct RoomManager {
    rooms: RwLock<HashMap<RoomKey, Members>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to a room. Returns false if it was already a member.
    pub async fn join(&self, room: RoomKey, conn: Arc<Connection>) -> bool {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room).or_default();
        let session_id = conn.session_id;
        let added = members.insert(session_id, Arc::clone(&conn)).is_none();
        let room_size = members.len();
        drop(rooms);

        conn.track_join(room).await;
        tracing::debug!(
            room = %room,
            session_id = %session_id,
            room_size = room_size,
            added = added,
            "Connection joined room"
        );
        added
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    pub async fn leave(&self, room: &RoomKey, conn: &Connection) -> bool {
        let mut rooms = self.rooms.write().await;
        let removed = match rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(&conn.session_id).is_some();
                if members.is_empty() {
                    rooms.remove(room);
                }
                removed
            }
            None => false,
        };
        drop(rooms);

        conn.track_leave(room).await;
        if removed {
            tracing::debug!(room = %room, session_id = %conn.session_id, "Connection left room");
        }
        removed
    }

    /// Send an event to every member of a room. Returns the number reached.
    pub async fn broadcast(&self, room: &RoomKey, event: &ServerEvent) -> usize {
        self.broadcast_except(room, None, event).await
    }

    /// Like [`broadcast`](Self::broadcast), skipping one session
    pub async fn broadcast_except(
        &self,
        room: &RoomKey,
        except: Option<Uuid>,
        event: &ServerEvent,
    ) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            tracing::trace!(room = %room, event = event.kind(), "No members in room");
            return 0;
        };

        let mut delivered = 0;
        let mut failed = 0;
        for conn in members.values() {
            if Some(conn.session_id) == except {
                continue;
            }
            if conn.send(event.clone()) {
                delivered += 1;
            } else {
                failed += 1;
            }
        }

        tracing::debug!(
            room = %room,
            event = event.kind(),
            recipients = delivered,
            failed = failed,
            "Broadcast event to room"
        );
        delivered
    }

    /// Remove a connection from every room
    pub async fn remove_connection(&self, session_id: &Uuid) -> usize {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0;
        for members in rooms.values_mut() {
            if members.remove(session_id).is_some() {
                removed_from += 1;
            }
        }
        rooms.retain(|_, members| !members.is_empty());
        removed_from
    }

    pub async fn room_size(&self, room: &RoomKey) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
