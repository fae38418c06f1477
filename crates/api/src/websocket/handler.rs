//! WebSocket handler for Axum
//!
//! Authenticates the upgrade request, then runs one writer task and one
//! reader loop per socket.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tourline_shared::{ChatError, Identity};

use super::dispatch::handle_client_event;
use super::events::{ClientEvent, ServerEvent};
use crate::auth::{authenticate, Credentials};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
    user_id: Option<String>,
    role: Option<String>,
}

impl From<WebSocketQuery> for Credentials {
    fn from(query: WebSocketQuery) -> Self {
        Credentials {
            token: query.token,
            user_id: query.user_id,
            role: query.role,
        }
    }
}

/// Upgrade an authenticated request to a WebSocket.
///
/// Credentials come from the query string; a failed check refuses the
/// upgrade with 401 before any room is joined.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let identity = match authenticate(&state.verifier, &params.into()) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket auth failed");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    tracing::info!(
        user_id = %identity.user_id,
        role = identity.role.as_str(),
        "WebSocket connection upgrade requested"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity, state)))
}

async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn = state.gateway.register(identity, tx).await;
    let session_id = conn.session_id;

    let _ = conn.send(ServerEvent::Connected {
        session_id,
        user_id: identity.user_id,
        role: identity.role,
    });

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, event = event.kind(), "Failed to serialize WebSocket event");
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(&state, &conn, event).await,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to parse client event");
                    let _ = conn.send(ServerEvent::error(&ChatError::validation(
                        "Invalid event format",
                    )));
                }
            },
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            // Axum answers protocol pings itself
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {}
        }
    }

    tracing::info!(session_id = %session_id, user_id = %identity.user_id, "WebSocket connection closing");
    state.gateway.unregister(&session_id).await;
    send_task.abort();
}
