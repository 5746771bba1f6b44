/// Task comment endpoints
///
/// # Endpoints
///
/// - `GET /v1/tasks/:id/comments` - comment tree with signed author pictures
/// - `POST /v1/tasks/:id/comments` - comment, or reply when `parent_id` is set
/// - `PATCH /v1/comments/:id` - author edits
/// - `DELETE /v1/comments/:id` - author deletes the comment and its replies

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    jobs,
};
use altruvist_shared::{
    auth::middleware::AuthContext,
    integrations::notifications::{topics, workflows, NotificationKind, TriggerRequest},
    models::{
        comment::{build_comment_tree, sign_author_pictures, Comment, CommentNode},
        outbox::JobPayload,
        task::Task,
        user::User,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EditCommentRequest {
    pub content: String,
}

/// Charity users talk to the task's volunteers; everyone else to its charity side
fn audience_topic(author: &User, task_id: Uuid) -> String {
    if author.is_charity() {
        topics::task_volunteers(task_id)
    } else {
        topics::task_charities(task_id)
    }
}

async fn find_own_comment(state: &AppState, id: Uuid, user_id: Uuid) -> ApiResult<Comment> {
    let comment = Comment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    if comment.user_id != user_id {
        return Err(ApiError::Forbidden(
            "Only the author can change this comment".to_string(),
        ));
    }
    Ok(comment)
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CommentNode>>> {
    let rows = Comment::list_for_task_with_authors(&state.db, task_id).await?;
    let mut tree = build_comment_tree(rows);
    sign_author_pictures(&mut tree, &state.storage).await;

    Ok(Json(tree))
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(task_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let task = Task::find_by_id(&state.db, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    let author = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let comment = match req.parent_id {
        Some(parent_id) => {
            Comment::create_reply(&state.db, task_id, auth.user_id, parent_id, &req.content)
                .await?
        }
        None => Comment::create(&state.db, task_id, auth.user_id, &req.content).await?,
    };

    let subject = if comment.parent_id.is_some() {
        "New reply"
    } else {
        "New comment"
    };
    let mut payload = jobs::with_kind(
        jobs::notice(
            subject,
            format!("{} commented on {}: {}", author.name, task.title, comment.content),
        ),
        NotificationKind::Message,
    );
    payload.body.avatar = author.profile_picture.clone();
    payload.body.task_id = Some(task_id.to_string());
    payload.body.user_id = Some(author.id.to_string());

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(
        &mut conn,
        vec![JobPayload::Notify(TriggerRequest::to_topic(
            workflows::COMMENTS_FEED,
            audience_topic(&author, task_id),
            payload,
        ))],
    )
    .await?;

    tracing::info!(task_id = %task_id, comment_id = %comment.id, user_id = %auth.user_id, "Comment posted");
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn edit_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<EditCommentRequest>,
) -> ApiResult<Json<Comment>> {
    find_own_comment(&state, id, auth.user_id).await?;
    Ok(Json(Comment::edit(&state.db, id, &req.content).await?))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    find_own_comment(&state, id, auth.user_id).await?;
    Comment::delete_with_descendants(&state.db, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
