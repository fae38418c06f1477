//! Private and group conversation routes

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tourline_shared::{Conversation, Identity, Message, MessageKind};
use uuid::Uuid;

use crate::{
    chat::{CreateGroup, HistoryPage, SendMessage},
    error::ApiResult,
    state::AppState,
    websocket::RoomKey,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StartPrivateRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactRequest {
    #[serde(default)]
    pub reaction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// A conversation as listed for one user, with their own unread count
#[derive(Debug, Serialize)]
pub struct ConversationListItem {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: u32,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub message_ids: Vec<Uuid>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<ConversationListItem>>> {
    let items = state
        .chat
        .list(identity.user_id)
        .await?
        .into_iter()
        .map(|conversation| ConversationListItem {
            unread_count: conversation.unread_counts.get(&identity.user_id),
            conversation,
        })
        .collect();
    Ok(Json(items))
}

/// POST /conversations/private
pub async fn start_private(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<StartPrivateRequest>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .chat
        .start_private(identity.user_id, req.user_id)
        .await?;
    Ok(Json(conversation))
}

/// POST /conversations/group
pub async fn create_group(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let outcome = state
        .chat
        .create_group(
            identity.user_id,
            CreateGroup {
                name: req.name,
                avatar: req.avatar,
                participants: req.participants,
            },
        )
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok((StatusCode::CREATED, Json(outcome.value)))
}

/// GET /conversations/:id
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state.chat.get(conversation_id, identity.user_id).await?;
    Ok(Json(conversation))
}

/// GET /conversations/:id/messages?page&limit
///
/// Reading history never marks messages as read.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<HistoryPage>> {
    let page = state
        .chat
        .history(conversation_id, identity.user_id, query.page, query.limit)
        .await?;
    Ok(Json(page))
}

/// POST /conversations/:id/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let outcome = state
        .chat
        .send_message(
            conversation_id,
            identity.user_id,
            SendMessage {
                content: req.content,
                kind: req.kind,
                reply_to: req.reply_to,
            },
        )
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok((StatusCode::CREATED, Json(outcome.value)))
}

/// POST /conversations/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<ReadResponse>> {
    let outcome = state
        .chat
        .mark_as_read(conversation_id, identity.user_id)
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok(Json(ReadResponse {
        message_ids: outcome.value,
    }))
}

/// POST /conversations/:id/participants
pub async fn add_participant(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<AddParticipantRequest>,
) -> ApiResult<Json<Conversation>> {
    let outcome = state
        .chat
        .add_participant(conversation_id, identity.user_id, req.user_id)
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok(Json(outcome.value))
}

/// POST /conversations/:id/leave
pub async fn leave(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.chat.leave(conversation_id, identity.user_id).await?;
    state
        .gateway
        .evict_user(&RoomKey::Conversation(conversation_id), &identity.user_id)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /conversations/:id
///
/// Hides the conversation for the caller only.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .chat
        .delete_conversation(conversation_id, identity.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /messages/:id
pub async fn edit_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<Uuid>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<Json<Message>> {
    let outcome = state
        .chat
        .edit(message_id, identity.user_id, &req.content)
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok(Json(outcome.value))
}

/// PUT /messages/:id/reaction
pub async fn react(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<Uuid>,
    Json(req): Json<ReactRequest>,
) -> ApiResult<Json<Message>> {
    let outcome = state
        .chat
        .react(message_id, identity.user_id, req.reaction)
        .await?;
    state.gateway.deliver(outcome.deliveries).await;
    Ok(Json(outcome.value))
}

/// DELETE /messages/:id
///
/// Hides the message for the caller only.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .chat
        .delete_message(message_id, identity.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
