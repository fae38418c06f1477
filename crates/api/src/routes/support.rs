//! Support conversation routes
//!
//! Users open a ticket, staff claim it from the waiting queue, and either side
//! can close it. The requesting user rates the conversation once it is closed.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tourline_shared::{Identity, SupportMessage, SupportTicket};
use uuid::Uuid;

use super::conversations::PageQuery;
use crate::{
    error::ApiResult,
    state::AppState,
    support::{CreateTicket, SubmitFeedback, TicketHistory},
};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    /// First message of the conversation, stored as the opening system message
    #[serde(alias = "content")]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub is_resolved: bool,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /support/conversations
pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<SupportTicket>)> {
    let outcome = state
        .support
        .create(
            &identity,
            CreateTicket {
                subject: req.subject,
                description: req.description,
            },
        )
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok((StatusCode::CREATED, Json(outcome.value)))
}

/// GET /support/conversations
pub async fn list_tickets(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<SupportTicket>>> {
    Ok(Json(state.support.list(&identity).await?))
}

/// GET /support/conversations/:id
pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<SupportTicket>> {
    Ok(Json(state.support.get(&identity, ticket_id).await?))
}

/// GET /support/conversations/:id/messages?page&limit
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<TicketHistory>> {
    let history = state
        .support
        .messages(&identity, ticket_id, query.page, query.limit)
        .await?;
    Ok(Json(history))
}

/// POST /support/conversations/:id/messages
pub async fn reply(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> ApiResult<(StatusCode, Json<SupportMessage>)> {
    let outcome = state
        .support
        .send(&identity, ticket_id, &req.content, req.reply_to)
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok((StatusCode::CREATED, Json(outcome.value)))
}

/// POST /support/conversations/:id/join (staff only)
pub async fn join_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<SupportTicket>> {
    let outcome = state.support.join(&identity, ticket_id).await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok(Json(outcome.value))
}

/// POST /support/conversations/:id/close
pub async fn close_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<SupportTicket>> {
    let outcome = state.support.close(&identity, ticket_id).await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok(Json(outcome.value))
}

/// POST /support/conversations/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<SupportTicket>> {
    let outcome = state.support.mark_read(&identity, ticket_id).await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok(Json(outcome.value))
}

/// POST /support/conversations/:id/feedback
pub async fn submit_feedback(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<Json<SupportTicket>> {
    let outcome = state
        .support
        .feedback(
            &identity,
            ticket_id,
            SubmitFeedback {
                is_resolved: req.is_resolved,
                rating: req.rating,
                comment: req.comment,
            },
        )
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok(Json(outcome.value))
}
