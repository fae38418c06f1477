//! Tourline Conversations API Library
//!
//! This crate contains the real-time conversation server: private and group
//! messaging, support tickets, the connection gateway and the staff
//! notification bridge.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod notifications;
pub mod routes;
pub mod state;
pub mod store;
pub mod support;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::{AppState, Stores};
