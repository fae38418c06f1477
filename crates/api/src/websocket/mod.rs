//! Connection gateway for real-time conversations
//!
//! # Architecture
//!
//! - **Connection**: an authenticated socket and the rooms it has joined
//! - **Room**: keyed pub/sub groups (inbox, conversation, support ticket, staff)
//! - **State**: the process-wide [`Gateway`] that applies service deliveries
//! - **Dispatch**: routes inbound client events to the conversation services
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: client/server event definitions

pub mod connection;
mod dispatch;
pub mod events;
pub mod handler;
pub mod room;
pub mod state;

pub use dispatch::handle_client_event;
pub use handler::ws_handler;
pub use room::RoomKey;
pub use state::{Gateway, GatewayStats};
