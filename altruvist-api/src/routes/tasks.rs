/// Task endpoints
///
/// # Endpoints
///
/// - `POST /v1/tasks` - create (admin, editor or volunteer of the charity)
/// - `GET /v1/tasks/explore` - public cursor listing
/// - `GET /v1/tasks/mine` - dashboard listing
/// - `GET /v1/tasks/:id` - task with applications
/// - `PATCH /v1/tasks/:id` - task manager edit
/// - `DELETE /v1/tasks/:id` - task manager delete
///
/// List-valued query parameters (`category`, `skills`) are comma separated.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    jobs,
};
use altruvist_shared::{
    auth::{
        authorization::{require_charity_role, require_task_manager},
        middleware::AuthContext,
    },
    filtering::TaskFilter,
    integrations::{notifications::topics, search::TASKS_INDEX},
    models::{
        membership::CharityRole,
        outbox::JobPayload,
        task::{
            CreateTask, ExplorePage, ExploreQuery, LocationType, SortDirection, Task,
            TaskStatus, TaskUrgency, TaskWithApplications, UpdateTask, UserTasksQuery,
        },
        user::{User, UserRole},
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct ExploreParams {
    pub cursor: Option<Uuid>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub skills: Option<String>,
    pub urgency: Option<TaskUrgency>,
    pub status: Option<TaskStatus>,
    pub location_type: Option<LocationType>,
    pub deadline: Option<SortDirection>,
    pub created_at: Option<SortDirection>,
    pub updated_at: Option<SortDirection>,
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl From<ExploreParams> for ExploreQuery {
    fn from(params: ExploreParams) -> Self {
        Self {
            cursor: params.cursor,
            limit: params.limit,
            category: split_list(params.category),
            skills: split_list(params.skills),
            urgency: params.urgency,
            status: params.status,
            location_type: params.location_type,
            deadline: params.deadline,
            created_at: params.created_at,
            updated_at: params.updated_at,
        }
    }
}

/// `GET /v1/tasks/mine` parameters
///
/// `status`, `charity_id`, the sort keys and `take` narrow the database
/// query; `search`, `urgency` and `skill` narrow the result in memory.
#[derive(Debug, Default, Deserialize)]
pub struct MyTasksParams {
    /// Defaults to the caller's platform role
    pub role: Option<UserRole>,
    pub status: Option<String>,
    pub charity_id: Option<Uuid>,
    pub deadline: Option<SortDirection>,
    pub created_at: Option<SortDirection>,
    pub updated_at: Option<SortDirection>,
    pub take: Option<i64>,
    pub search: Option<String>,
    pub urgency: Option<String>,
    pub skill: Option<String>,
}

impl MyTasksParams {
    fn split(self) -> (Option<UserRole>, UserTasksQuery, TaskFilter) {
        let query = UserTasksQuery {
            status: self.status,
            charity_id: self.charity_id,
            deadline: self.deadline,
            created_at: self.created_at,
            updated_at: self.updated_at,
            take: self.take,
        };
        let filter = TaskFilter {
            search: self.search.unwrap_or_default(),
            urgency: self.urgency,
            skills: self.skill,
            ..Default::default()
        };
        (self.role, query, filter)
    }
}

async fn find_task(state: &AppState, id: Uuid) -> ApiResult<Task> {
    Task::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

async fn find_listing(state: &AppState, id: Uuid) -> ApiResult<TaskWithApplications> {
    Task::find_with_applications(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

/// Creates a task and its two notification topics; the creator follows the
/// charities topic.
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateTask>,
) -> ApiResult<(StatusCode, Json<TaskWithApplications>)> {
    req.validate()?;
    require_charity_role(&state.db, auth.user_id, req.charity_id, CharityRole::task_posting())
        .await?;

    let mut tx = state.db.begin().await?;
    let task = Task::create(&mut *tx, req, auth.user_id).await?;

    let charities_key = topics::task_charities(task.id);
    let pending = vec![
        JobPayload::CreateTopic {
            key: charities_key.clone(),
            name: format!("{} charities", task.title),
        },
        JobPayload::CreateTopic {
            key: topics::task_volunteers(task.id),
            name: format!("{} volunteers", task.title),
        },
        JobPayload::SubscribeToTopic {
            key: charities_key,
            subscriber_ids: vec![auth.user_id.to_string()],
        },
    ];
    jobs::enqueue_all(&mut tx, pending).await?;
    tx.commit().await?;

    let listing = find_listing(&state, task.id).await?;
    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, vec![jobs::index(TASKS_INDEX, &listing)?]).await?;

    tracing::info!(task_id = %task.id, user_id = %auth.user_id, "Task created");
    Ok((StatusCode::CREATED, Json(listing)))
}

pub async fn explore(
    State(state): State<AppState>,
    Query(params): Query<ExploreParams>,
) -> ApiResult<Json<ExplorePage>> {
    let query = ExploreQuery::from(params);
    Ok(Json(Task::explore(&state.db, &query).await?))
}

pub async fn my_tasks(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<MyTasksParams>,
) -> ApiResult<Json<Vec<TaskWithApplications>>> {
    let (role, query, filter) = params.split();

    let role = match role {
        Some(role) => role,
        None => {
            let user = User::find_by_id(&state.db, auth.user_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
            if user.is_charity() {
                UserRole::Charity
            } else {
                UserRole::Volunteer
            }
        }
    };

    let tasks = Task::list_for_user(&state.db, role, auth.user_id, &query).await?;
    Ok(Json(filter.apply(tasks)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskWithApplications>> {
    Ok(Json(find_listing(&state, id).await?))
}

pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTask>,
) -> ApiResult<Json<TaskWithApplications>> {
    let task = find_task(&state, id).await?;
    require_task_manager(&state.db, auth.user_id, &task).await?;
    req.validate()?;

    Task::update(&state.db, id, req)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    let listing = find_listing(&state, id).await?;
    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, vec![jobs::index(TASKS_INDEX, &listing)?]).await?;

    tracing::info!(task_id = %id, user_id = %auth.user_id, "Task updated");
    Ok(Json(listing))
}

pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let task = find_task(&state, id).await?;
    require_task_manager(&state.db, auth.user_id, &task).await?;

    Task::delete(&state.db, id).await?;

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, vec![jobs::remove(TASKS_INDEX, id)]).await?;

    tracing::info!(task_id = %id, user_id = %auth.user_id, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explore_params_split_lists() {
        let query = ExploreQuery::from(ExploreParams {
            category: Some("Healthcare, Education,,".to_string()),
            skills: Some("Design".to_string()),
            urgency: Some(TaskUrgency::High),
            ..Default::default()
        });

        assert_eq!(query.category, vec!["Healthcare", "Education"]);
        assert_eq!(query.skills, vec!["Design"]);
        assert_eq!(query.urgency, Some(TaskUrgency::High));
        assert!(query.cursor.is_none());
    }

    #[test]
    fn test_my_tasks_params_split() {
        let (role, query, filter) = MyTasksParams {
            role: Some(UserRole::Volunteer),
            status: Some("ACCEPTED".to_string()),
            take: Some(5),
            deadline: Some(SortDirection::Asc),
            search: Some("river".to_string()),
            skill: Some("Design".to_string()),
            ..Default::default()
        }
        .split();

        assert_eq!(role, Some(UserRole::Volunteer));
        assert_eq!(query.status.as_deref(), Some("ACCEPTED"));
        assert_eq!(query.take, Some(5));
        assert_eq!(filter.search, "river");
        assert_eq!(filter.skills.as_deref(), Some("Design"));
        assert_eq!(query.deadline, Some(SortDirection::Asc));
        assert!(filter.status.is_none());
        assert!(filter.deadline.is_none());
    }
}
