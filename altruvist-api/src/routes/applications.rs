/// Task application endpoints
///
/// # Endpoints
///
/// - `POST /v1/tasks/:id/applications` - apply to a task
/// - `GET /v1/tasks/:id/applications` - applications with applicant details (task manager)
/// - `PATCH /v1/applications/:id` - status action
/// - `DELETE /v1/applications/:id` - delete (applicant or task manager)
///
/// # Status actions
///
/// | action | new status | who |
/// |---|---|---|
/// | `accept` | ACCEPTED | task manager |
/// | `reject` | REJECTED | task manager |
/// | `undo` | PENDING | task manager |
/// | `removeVolunteer` | WITHDRAWN | task manager |
/// | `withdraw` | WITHDRAWN | applicant |

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    jobs,
};
use altruvist_shared::{
    auth::{
        authorization::{is_task_manager, require_task_manager},
        middleware::AuthContext,
    },
    integrations::{
        notifications::{topics, workflows, NotificationKind, TriggerRequest},
        search::TASK_APPLICATIONS_INDEX,
    },
    models::{
        outbox::JobPayload,
        task::Task,
        task_application::{
            ApplicationStatus, ApplicationWithApplicant, CreateTaskApplication, TaskApplication,
        },
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

#[derive(Debug, Default, Deserialize)]
pub struct ApplyRequest {
    pub message: Option<String>,
    pub volunteer_wallet_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplicationAction {
    Accept,
    Reject,
    Withdraw,
    Undo,
    RemoveVolunteer,
}

impl ApplicationAction {
    pub fn target_status(&self) -> ApplicationStatus {
        match self {
            ApplicationAction::Accept => ApplicationStatus::Accepted,
            ApplicationAction::Reject => ApplicationStatus::Rejected,
            ApplicationAction::Undo => ApplicationStatus::Pending,
            ApplicationAction::Withdraw | ApplicationAction::RemoveVolunteer => {
                ApplicationStatus::Withdrawn
            }
        }
    }

    /// Withdrawing is the applicant's call; everything else belongs to the task's managers
    pub fn by_applicant(&self) -> bool {
        matches!(self, ApplicationAction::Withdraw)
    }
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: ApplicationAction,
}

/// Tells the task's managers that `applicant` has a pending application
fn new_application_notice(applicant: &User, task: &Task, application_id: Uuid) -> JobPayload {
    let mut payload = jobs::with_kind(
        jobs::notice(
            "New application",
            format!("{} has applied for {}", applicant.name, task.title),
        ),
        NotificationKind::Applied,
    );
    payload.body.avatar = applicant.profile_picture.clone();
    payload.body.task_application_id = Some(application_id.to_string());
    payload.body.task_id = Some(task.id.to_string());
    payload.body.user_id = Some(applicant.id.to_string());

    JobPayload::Notify(TriggerRequest::to_topic(
        workflows::APPLICATIONS_FEED,
        topics::task_charities(task.id),
        payload,
    ))
}

async fn find_task(state: &AppState, id: Uuid) -> ApiResult<Task> {
    Task::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

async fn find_application(state: &AppState, id: Uuid) -> ApiResult<TaskApplication> {
    TaskApplication::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task application not found".to_string()))
}

async fn find_user(state: &AppState, id: Uuid) -> ApiResult<User> {
    User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Applies to a task.
///
/// The applicant follows the task's volunteers topic and the task's charity
/// side is told about the application.
///
/// # Errors
///
/// - `404 Not Found`: unknown task
/// - `409 Conflict`: already applied
pub async fn apply(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ApplyRequest>,
) -> ApiResult<(StatusCode, Json<TaskApplication>)> {
    let task = find_task(&state, task_id).await?;
    let user = find_user(&state, auth.user_id).await?;

    let application = TaskApplication::apply(
        &state.db,
        CreateTaskApplication {
            task_id,
            user_id: auth.user_id,
            charity_id: task.charity_id,
            message: req.message,
            volunteer_wallet_address: req.volunteer_wallet_address,
        },
    )
    .await?;

    let pending = vec![
        JobPayload::SubscribeToTopic {
            key: topics::task_volunteers(task_id),
            subscriber_ids: vec![auth.user_id.to_string()],
        },
        new_application_notice(&user, &task, application.id),
        jobs::index(TASK_APPLICATIONS_INDEX, &application)?,
    ];
    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, pending).await?;

    tracing::info!(task_id = %task_id, user_id = %auth.user_id, application_id = %application.id, "Applied to task");
    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn list_for_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ApplicationWithApplicant>>> {
    let task = find_task(&state, task_id).await?;
    require_task_manager(&state.db, auth.user_id, &task).await?;

    Ok(Json(
        TaskApplication::list_with_applicants(&state.db, task_id).await?,
    ))
}

/// Moves an application through its lifecycle.
///
/// Accepting and rejecting notify the applicant directly; undoing notifies
/// the task's managers as if the volunteer had just applied.
///
/// # Errors
///
/// - `400 Bad Request`: accepting when every volunteer spot is taken
/// - `403 Forbidden`: caller may not perform this action
pub async fn application_action(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<Json<TaskApplication>> {
    let application = find_application(&state, id).await?;
    let task = find_task(&state, application.task_id).await?;

    if req.action.by_applicant() {
        if application.user_id != auth.user_id {
            return Err(ApiError::Forbidden(
                "Only the applicant can withdraw an application".to_string(),
            ));
        }
    } else {
        require_task_manager(&state.db, auth.user_id, &task).await?;
    }

    let updated =
        TaskApplication::update_status(&state.db, id, req.action.target_status()).await?;

    let mut pending = vec![jobs::index(TASK_APPLICATIONS_INDEX, &updated)?];

    let decision = match req.action {
        ApplicationAction::Accept => Some((
            "Application accepted",
            format!("Your application for {} has been accepted", task.title),
            NotificationKind::Approved,
        )),
        ApplicationAction::Reject => Some((
            "Application rejected",
            format!("Your application for {} was not accepted", task.title),
            NotificationKind::Rejected,
        )),
        _ => None,
    };

    // Undoing a decision puts the application back in front of the managers
    if matches!(req.action, ApplicationAction::Undo) {
        let applicant = find_user(&state, application.user_id).await?;
        pending.push(new_application_notice(&applicant, &task, id));
    }

    if let Some((subject, message, kind)) = decision {
        let applicant = find_user(&state, application.user_id).await?;
        let mut payload = jobs::with_kind(jobs::notice(subject, message), kind);
        payload.body.task_application_id = Some(id.to_string());
        payload.body.task_id = Some(task.id.to_string());

        pending.push(JobPayload::Notify(TriggerRequest::to_subscriber(
            workflows::APPLICATIONS_FEED,
            applicant.id.to_string(),
            applicant.email.clone(),
            &applicant.name,
            payload,
        )));
    }

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, pending).await?;

    Ok(Json(updated))
}

pub async fn delete_application(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let application = find_application(&state, id).await?;

    if application.user_id != auth.user_id {
        let task = find_task(&state, application.task_id).await?;
        if !is_task_manager(&state.db, auth.user_id, &task).await? {
            return Err(ApiError::Forbidden(
                "Not authorized to delete this application".to_string(),
            ));
        }
    }

    TaskApplication::delete(&state.db, id).await?;

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, vec![jobs::remove(TASK_APPLICATIONS_INDEX, id)]).await?;

    tracing::info!(application_id = %id, user_id = %auth.user_id, "Task application deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_targets() {
        assert_eq!(ApplicationAction::Accept.target_status(), ApplicationStatus::Accepted);
        assert_eq!(ApplicationAction::Reject.target_status(), ApplicationStatus::Rejected);
        assert_eq!(ApplicationAction::Undo.target_status(), ApplicationStatus::Pending);
        assert_eq!(
            ApplicationAction::RemoveVolunteer.target_status(),
            ApplicationStatus::Withdrawn
        );
        assert!(ApplicationAction::Withdraw.by_applicant());
        assert!(!ApplicationAction::RemoveVolunteer.by_applicant());
    }

    #[test]
    fn test_action_request() {
        let req: ActionRequest =
            serde_json::from_value(json!({ "action": "removeVolunteer" })).unwrap();
        assert_eq!(req.action, ApplicationAction::RemoveVolunteer);

        assert!(serde_json::from_value::<ActionRequest>(json!({ "action": "approve" })).is_err());
    }
}
