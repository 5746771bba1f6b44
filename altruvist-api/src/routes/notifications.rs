/// In-app notification feed
///
/// The caller's user id is their Novu subscriber id.
///
/// # Endpoints
///
/// - `GET /v1/notifications` - first page of the feed
/// - `POST /v1/notifications/:id/read` - mark one message read
/// - `POST /v1/notifications/read-all` - mark every message read
/// - `DELETE /v1/notifications/:id` - delete a message

use crate::{app::AppState, error::ApiResult};
use altruvist_shared::{
    auth::middleware::AuthContext, integrations::notifications::NotificationItem,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<NotificationItem>>> {
    let items = state
        .notifications
        .list_notifications(&auth.user_id.to_string())
        .await?;
    Ok(Json(items))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(message_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .notifications
        .mark_as_read(&auth.user_id.to_string(), &message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<StatusCode> {
    state
        .notifications
        .mark_all_as_read(&auth.user_id.to_string())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(message_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.notifications.delete_message(&message_id).await?;
    tracing::debug!(user_id = %auth.user_id, message_id = %message_id, "Notification deleted");
    Ok(StatusCode::NO_CONTENT)
}
