/// Charity endpoints
///
/// # Endpoints
///
/// - `POST /v1/charities` - create; the caller becomes its admin
/// - `GET /v1/charities` - list
/// - `GET /v1/charities/:id` - get
/// - `PATCH /v1/charities/:id` - admin edit
/// - `DELETE /v1/charities/:id` - creator or admin
/// - `GET /v1/charities/:id/members` - members with profiles
/// - `GET /v1/charities/:id/tasks` - the charity's tasks
/// - `GET /v1/charities/:id/applications` - membership applications (admin, coordinator)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    jobs,
};
use altruvist_shared::{
    auth::{
        authorization::{require_charity_admin, require_charity_role},
        middleware::AuthContext,
    },
    integrations::{notifications::topics, search::CHARITIES_INDEX},
    models::{
        charity::{Charity, CreateCharity, UpdateCharity},
        charity_application::{CharityApplication, CharityApplicationStatus},
        membership::{CharityMembership, CharityRole, CreateMembership, MemberWithUser},
        outbox::JobPayload,
        task::{Task, TaskWithApplications},
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::PgConnection;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationsQuery {
    pub status: Option<CharityApplicationStatus>,
}

/// Topic subscriptions that follow from holding `roles` in a charity
pub(crate) fn member_topic_jobs(charity_id: Uuid, user_id: Uuid, roles: &[String]) -> Vec<JobPayload> {
    let mut keys = Vec::new();
    if roles.iter().any(|r| r == CharityRole::Admin.as_str()) {
        keys.push(topics::charity_admins(charity_id));
    }
    if roles.iter().any(|r| r == CharityRole::Coordinator.as_str()) {
        keys.push(topics::charity_coordinators(charity_id));
    }

    keys.into_iter()
        .map(|key| JobPayload::SubscribeToTopic {
            key,
            subscriber_ids: vec![user_id.to_string()],
        })
        .collect()
}

/// Creates a charity with `user_id` as admin, plus its topics and index entry
pub(crate) async fn create_with_admin(
    conn: &mut PgConnection,
    data: CreateCharity,
    user_id: Uuid,
) -> ApiResult<Charity> {
    let charity = Charity::create(&mut *conn, data, user_id).await?;
    let membership = CharityMembership::create(
        &mut *conn,
        CreateMembership {
            user_id,
            charity_id: charity.id,
            roles: vec![CharityRole::Admin.as_str().to_string()],
            permissions: Vec::new(),
        },
    )
    .await?;

    let mut pending = vec![
        JobPayload::CreateTopic {
            key: topics::charity_admins(charity.id),
            name: format!("{} admins", charity.name),
        },
        JobPayload::CreateTopic {
            key: topics::charity_coordinators(charity.id),
            name: format!("{} coordinators", charity.name),
        },
    ];
    pending.extend(member_topic_jobs(charity.id, user_id, &membership.roles));
    pending.push(jobs::index(CHARITIES_INDEX, &charity)?);
    jobs::enqueue_all(conn, pending).await?;

    tracing::info!(charity_id = %charity.id, user_id = %user_id, "Charity created");
    Ok(charity)
}

pub async fn create_charity(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateCharity>,
) -> ApiResult<(StatusCode, Json<Charity>)> {
    req.validate()?;

    let mut tx = state.db.begin().await?;
    let charity = create_with_admin(&mut tx, req, auth.user_id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(charity)))
}

pub async fn list_charities(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Charity>>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    Ok(Json(Charity::list(&state.db, limit, offset).await?))
}

pub async fn get_charity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Charity>> {
    Charity::find_by_id(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Charity not found".to_string()))
}

pub async fn update_charity(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCharity>,
) -> ApiResult<Json<Charity>> {
    require_charity_admin(&state.db, auth.user_id, id).await?;
    req.validate()?;

    let charity = Charity::update(&state.db, id, req)
        .await?
        .ok_or_else(|| ApiError::NotFound("Charity not found".to_string()))?;

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, vec![jobs::index(CHARITIES_INDEX, &charity)?]).await?;

    Ok(Json(charity))
}

pub async fn delete_charity(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let charity = Charity::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Charity not found".to_string()))?;

    if charity.created_by != Some(auth.user_id) {
        require_charity_admin(&state.db, auth.user_id, id).await?;
    }

    Charity::delete(&state.db, id).await?;

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, vec![jobs::remove(CHARITIES_INDEX, id)]).await?;

    tracing::info!(charity_id = %id, user_id = %auth.user_id, "Charity deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<MemberWithUser>>> {
    Ok(Json(CharityMembership::list_for_charity(&state.db, id).await?))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<TaskWithApplications>>> {
    Ok(Json(Task::list_for_charity(&state.db, id).await?))
}

pub async fn list_applications(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Query(query): Query<ApplicationsQuery>,
) -> ApiResult<Json<Vec<CharityApplication>>> {
    require_charity_role(
        &state.db,
        auth.user_id,
        id,
        &[CharityRole::Admin, CharityRole::Coordinator],
    )
    .await?;

    Ok(Json(
        CharityApplication::list_for_charity(&state.db, id, query.status).await?,
    ))
}
