//! Connection gateway state
//!
//! Tracks every live connection and the rooms they belong to, and applies
//! the deliveries produced by the conversation services.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tourline_shared::{Identity, Role};
use uuid::Uuid;

use super::connection::Connection;
use super::events::{Delivery, ServerEvent};
use super::room::{RoomKey, RoomManager};
use crate::notifications::{NotificationEvent, RelayError, StaffRelay};

/// Process-wide gateway shared by socket tasks, HTTP handlers and the relay
#[derive(Clone)]
pub struct Gateway {
    connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,
    pub rooms: Arc<RoomManager>,
    closed: Arc<AtomicBool>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register an authenticated connection and join its default rooms:
    /// everyone joins their own inbox, staff also join the staff room
    pub async fn register(
        &self,
        identity: Identity,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(identity, sender));
        let total = {
            let mut connections = self.connections.write().await;
            connections.insert(conn.session_id, Arc::clone(&conn));
            connections.len()
        };

        self.rooms
            .join(RoomKey::Inbox(identity.user_id), Arc::clone(&conn))
            .await;
        if identity.role == Role::Staff {
            self.rooms.join(RoomKey::Staff, Arc::clone(&conn)).await;
        }

        tracing::info!(
            session_id = %conn.session_id,
            user_id = %identity.user_id,
            role = identity.role.as_str(),
            total_connections = total,
            "Connection registered"
        );
        conn
    }

    /// Drop a connection from the registry and every room
    pub async fn unregister(&self, session_id: &Uuid) {
        let removed = self.connections.write().await.remove(session_id);
        if let Some(conn) = removed {
            let rooms = self.rooms.remove_connection(session_id).await;
            tracing::info!(
                session_id = %session_id,
                user_id = %conn.user_id(),
                rooms = rooms,
                "Connection unregistered"
            );
        }
    }

    /// Apply service deliveries in order
    pub async fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.rooms.broadcast(&delivery.room, &delivery.event).await;
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Connections currently open for a user, across devices
    pub async fn user_connections(&self, user_id: &Uuid) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.user_id() == *user_id)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            active_connections: self.connection_count().await,
            active_rooms: self.rooms.room_count().await,
            staff_online: self.rooms.room_size(&RoomKey::Staff).await,
        }
    }

    /// Remove every connection of a user from a room, e.g. after they leave a group
    pub async fn evict_user(&self, room: &RoomKey, user_id: &Uuid) -> usize {
        let mut evicted = 0;
        for conn in self.user_connections(user_id).await {
            if self.rooms.leave(room, &conn).await {
                evicted += 1;
            }
        }
        evicted
    }

    /// Stop accepting relayed notifications
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StaffRelay for Gateway {
    async fn relay(&self, event: &NotificationEvent) -> Result<usize, RelayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Closed);
        }
        let event = ServerEvent::StaffNotification {
            notification: event.clone(),
        };
        Ok(self.rooms.broadcast(&RoomKey::Staff, &event).await)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub active_connections: usize,
    pub active_rooms: usize,
    pub staff_online: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_joins_default_room() {
        let gateway = Gateway::new();
        let user = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = gateway.register(Identity::user(user), tx).await;
        assert!(conn.is_member(&RoomKey::Inbox(user)).await);

        let (tx, _rx2) = mpsc::unbounded_channel();
        let staff_id = Uuid::new_v4();
        let staff = gateway.register(Identity::staff(staff_id), tx).await;
        assert!(staff.is_member(&RoomKey::Staff).await);
        assert!(staff.is_member(&RoomKey::Inbox(staff_id)).await);

        let stats = gateway.stats().await;
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.active_rooms, 3);
        assert_eq!(stats.staff_online, 1);

        gateway.unregister(&conn.session_id).await;
        gateway.unregister(&staff.session_id).await;
        assert_eq!(gateway.stats().await.active_rooms, 0);
    }

    #[tokio::test]
    async fn test_relay_reaches_staff_only() {
        let gateway = Gateway::new();
        let (tx_user, mut rx_user) = mpsc::unbounded_channel();
        let (tx_staff, mut rx_staff) = mpsc::unbounded_channel();
        gateway.register(Identity::user(Uuid::new_v4()), tx_user).await;
        gateway.register(Identity::staff(Uuid::new_v4()), tx_staff).await;

        let event = NotificationEvent::new("test", "t", "m", serde_json::Value::Null);
        assert_eq!(gateway.relay(&event).await.unwrap(), 1);
        assert!(matches!(
            rx_staff.try_recv(),
            Ok(ServerEvent::StaffNotification { .. })
        ));
        assert!(rx_user.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_gateway_refuses_relay() {
        let gateway = Gateway::new();
        gateway.close();
        let event = NotificationEvent::new("test", "t", "m", serde_json::Value::Null);
        assert!(matches!(gateway.relay(&event).await, Err(RelayError::Closed)));
    }

    #[tokio::test]
    async fn test_user_connections_across_devices() {
        let gateway = Gateway::new();
        let user = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        gateway.register(Identity::user(user), tx1).await;
        gateway.register(Identity::user(user), tx2).await;
        assert_eq!(gateway.user_connections(&user).await.len(), 2);
    }
}
