//! Internal producer endpoint for staff notifications
//!
//! Other parts of the platform (bookings, payments) post events here to have
//! them relayed to connected staff. The request succeeds even when the broker
//! is down; `queued` reports whether the event reached the channel.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tourline_shared::{ChatError, Identity};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    notifications::NotificationEvent,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PublishNotificationRequest {
    pub category: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PublishNotificationResponse {
    pub id: Uuid,
    pub queued: bool,
}

/// POST /internal/notifications (staff only)
pub async fn publish(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PublishNotificationRequest>,
) -> ApiResult<(StatusCode, Json<PublishNotificationResponse>)> {
    if !identity.is_staff() {
        return Err(ChatError::access_denied("Staff token required").into());
    }
    if req.category.trim().is_empty() || req.title.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "category and title are required".to_string(),
        ));
    }

    let event = NotificationEvent::new(req.category.trim(), req.title, req.message, req.data);
    let id = event.id;
    let queued = state.notifier.publish(event).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishNotificationResponse { id, queued }),
    ))
}
