//! API routes

pub mod conversations;
pub mod health;
pub mod notifications;
pub mod support;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let protected_api_routes = Router::new()
        // Conversations
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/private", post(conversations::start_private))
        .route("/conversations/group", post(conversations::create_group))
        .route(
            "/conversations/:id",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route("/conversations/:id/read", post(conversations::mark_read))
        .route("/conversations/:id/participants", post(conversations::add_participant))
        .route("/conversations/:id/leave", post(conversations::leave))
        .route(
            "/messages/:id",
            patch(conversations::edit_message).delete(conversations::delete_message),
        )
        .route("/messages/:id/reaction", put(conversations::react))
        // Support
        .route(
            "/support/conversations",
            get(support::list_tickets).post(support::create_ticket),
        )
        .route("/support/conversations/:id", get(support::get_ticket))
        .route(
            "/support/conversations/:id/messages",
            get(support::list_messages).post(support::reply),
        )
        .route("/support/conversations/:id/join", post(support::join_ticket))
        .route("/support/conversations/:id/close", post(support::close_ticket))
        .route("/support/conversations/:id/read", post(support::mark_read))
        .route("/support/conversations/:id/feedback", post(support::submit_feedback))
        // Internal producers
        .route("/internal/notifications", post(notifications::publish))
        .layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            require_auth,
        ));

    // WebSocket routes (auth handled in handler via query parameters)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let api_v1_routes = Router::new()
        .merge(protected_api_routes)
        .merge(websocket_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
