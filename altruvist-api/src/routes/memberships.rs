/// Charity membership actions
///
/// `POST /v1/memberships` takes a body tagged by `action`:
///
/// | action | body | who |
/// |---|---|---|
/// | `join` | `charity_id`, `roles`, `permissions?` | anyone, non-admin roles |
/// | `apply` | `charity_id`, `roles`, `application_note?` | anyone |
/// | `review` | `application_id`, `status`, `review_note?` | charity admins |
/// | `leave` | `charity_id` | members |
/// | `updateMember` | `member_id`, `roles` | charity admins |
/// | `removeMember` | `user_id`, `charity_id` | charity admins |
///
/// A charity always keeps at least one admin.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    jobs,
    routes::charities::member_topic_jobs,
};
use altruvist_shared::{
    auth::{authorization::require_charity_admin, middleware::AuthContext},
    integrations::notifications::{topics, workflows, NotificationKind, TriggerRequest},
    models::{
        charity::Charity,
        charity_application::{
            CharityApplication, CharityApplicationStatus, CreateCharityApplication,
        },
        membership::{CharityMembership, CharityRole, CreateMembership},
        outbox::JobPayload,
        user::User,
    },
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MembershipAction {
    Join {
        charity_id: Uuid,
        roles: Vec<String>,
        #[serde(default)]
        permissions: Vec<String>,
    },
    Apply {
        charity_id: Uuid,
        roles: Vec<String>,
        application_note: Option<String>,
    },
    Review {
        application_id: Uuid,
        status: CharityApplicationStatus,
        review_note: Option<String>,
    },
    Leave {
        charity_id: Uuid,
    },
    UpdateMember {
        member_id: Uuid,
        roles: Vec<String>,
    },
    RemoveMember {
        user_id: Uuid,
        charity_id: Uuid,
    },
}

#[derive(Debug, Serialize)]
pub struct MembershipActionResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership: Option<CharityMembership>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<CharityApplication>,
}

impl MembershipActionResponse {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            membership: None,
            application: None,
        }
    }
}

/// Checks role names and returns them in canonical order without duplicates
fn parse_roles(roles: &[String]) -> ApiResult<Vec<CharityRole>> {
    if roles.is_empty() {
        return Err(ApiError::BadRequest("At least one role is required".to_string()));
    }

    let mut parsed = Vec::with_capacity(roles.len());
    for name in roles {
        let role = CharityRole::parse(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown role: {name}")))?;
        if !parsed.contains(&role) {
            parsed.push(role);
        }
    }
    Ok(parsed)
}

fn role_list(roles: &[CharityRole]) -> String {
    roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
}

/// Fails when `membership` holds the charity's only admin role
async fn ensure_not_sole_admin(
    state: &AppState,
    membership: &CharityMembership,
    message: &str,
) -> ApiResult<()> {
    if membership.is_admin()
        && CharityMembership::count_admins(&state.db, membership.charity_id).await? <= 1
    {
        return Err(ApiError::BadRequest(message.to_string()));
    }
    Ok(())
}

async fn find_charity(state: &AppState, id: Uuid) -> ApiResult<Charity> {
    Charity::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Charity not found".to_string()))
}

async fn find_user(state: &AppState, id: Uuid) -> ApiResult<User> {
    User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub async fn membership_action(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(action): Json<MembershipAction>,
) -> ApiResult<Json<MembershipActionResponse>> {
    let response = match action {
        MembershipAction::Join {
            charity_id,
            roles,
            permissions,
        } => join(&state, auth.user_id, charity_id, &roles, permissions).await?,
        MembershipAction::Apply {
            charity_id,
            roles,
            application_note,
        } => apply(&state, auth.user_id, charity_id, &roles, application_note).await?,
        MembershipAction::Review {
            application_id,
            status,
            review_note,
        } => review(&state, auth.user_id, application_id, status, review_note).await?,
        MembershipAction::Leave { charity_id } => leave(&state, auth.user_id, charity_id).await?,
        MembershipAction::UpdateMember { member_id, roles } => {
            update_member(&state, auth.user_id, member_id, &roles).await?
        }
        MembershipAction::RemoveMember {
            user_id,
            charity_id,
        } => remove_member(&state, auth.user_id, user_id, charity_id).await?,
    };

    Ok(Json(response))
}

async fn join(
    state: &AppState,
    user_id: Uuid,
    charity_id: Uuid,
    roles: &[String],
    permissions: Vec<String>,
) -> ApiResult<MembershipActionResponse> {
    let roles = parse_roles(roles)?;
    if roles.contains(&CharityRole::Admin) {
        return Err(ApiError::Forbidden(
            "The admin role requires an application".to_string(),
        ));
    }

    let charity = find_charity(state, charity_id).await?;
    let user = find_user(state, user_id).await?;
    let described = role_list(&roles);

    let mut tx = state.db.begin().await?;
    let membership = CharityMembership::create(
        &mut *tx,
        CreateMembership {
            user_id,
            charity_id,
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            permissions,
        },
    )
    .await?;

    let mut pending = member_topic_jobs(charity_id, user_id, &membership.roles);
    pending.push(JobPayload::Notify(TriggerRequest::to_topic(
        workflows::CHARITIES_FEED,
        topics::charity_admins(charity_id),
        jobs::with_kind(
            jobs::notice(
                "New member",
                format!("{} has joined the charity {} as {described}", user.name, charity.name),
            ),
            NotificationKind::Update,
        ),
    )));
    jobs::enqueue_all(&mut tx, pending).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, charity_id = %charity_id, roles = %described, "Joined charity");

    Ok(MembershipActionResponse {
        membership: Some(membership),
        ..MembershipActionResponse::message("Joined charity")
    })
}

async fn apply(
    state: &AppState,
    user_id: Uuid,
    charity_id: Uuid,
    roles: &[String],
    application_note: Option<String>,
) -> ApiResult<MembershipActionResponse> {
    let roles = parse_roles(roles)?;
    let charity = find_charity(state, charity_id).await?;
    let user = find_user(state, user_id).await?;
    let described = role_list(&roles);

    let application = CharityApplication::create(
        &state.db,
        CreateCharityApplication {
            user_id,
            charity_id,
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            application_note: application_note.clone(),
        },
    )
    .await?;

    let message = match application_note.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(note) => format!(
            "{} has applied to join {} as {described}. Note: {note}",
            user.name, charity.name
        ),
        None => format!("{} has applied to join {} as {described}", user.name, charity.name),
    };
    let payload = jobs::with_kind(jobs::notice("New application", message), NotificationKind::Applied);

    let pending = [
        topics::charity_coordinators(charity_id),
        topics::charity_admins(charity_id),
    ]
    .into_iter()
    .map(|key| {
        JobPayload::Notify(TriggerRequest::to_topic(
            workflows::CHARITIES_FEED,
            key,
            payload.clone(),
        ))
    })
    .collect();

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, pending).await?;

    tracing::info!(user_id = %user_id, charity_id = %charity_id, application_id = %application.id, "Charity application submitted");

    Ok(MembershipActionResponse {
        application: Some(application),
        ..MembershipActionResponse::message("Application submitted")
    })
}

async fn review(
    state: &AppState,
    reviewer: Uuid,
    application_id: Uuid,
    status: CharityApplicationStatus,
    review_note: Option<String>,
) -> ApiResult<MembershipActionResponse> {
    if status == CharityApplicationStatus::Pending {
        return Err(ApiError::BadRequest(
            "Status must be ACCEPTED or REJECTED".to_string(),
        ));
    }

    let application = CharityApplication::find_by_id(&state.db, application_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Application not found".to_string()))?;
    require_charity_admin(&state.db, reviewer, application.charity_id).await?;

    let outcome =
        CharityApplication::review(&state.db, application_id, reviewer, status, review_note)
            .await?;

    if let Some(membership) = &outcome.membership {
        let mut conn = state.db.acquire().await?;
        jobs::enqueue_all(
            &mut conn,
            member_topic_jobs(membership.charity_id, membership.user_id, &membership.roles),
        )
        .await?;
    }

    tracing::info!(
        application_id = %application_id,
        reviewer = %reviewer,
        status = status.as_str(),
        "Charity application reviewed"
    );

    Ok(MembershipActionResponse {
        message: format!("Application {}", status.as_str().to_lowercase()),
        membership: outcome.membership,
        application: Some(outcome.application),
    })
}

async fn leave(
    state: &AppState,
    user_id: Uuid,
    charity_id: Uuid,
) -> ApiResult<MembershipActionResponse> {
    let membership = CharityMembership::find(&state.db, user_id, charity_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Membership not found".to_string()))?;

    ensure_not_sole_admin(
        state,
        &membership,
        "You are the only admin of this charity. Please appoint another admin before leaving.",
    )
    .await?;

    CharityMembership::delete(&state.db, user_id, charity_id).await?;
    tracing::info!(user_id = %user_id, charity_id = %charity_id, "Left charity");

    Ok(MembershipActionResponse::message("Left charity"))
}

async fn update_member(
    state: &AppState,
    caller: Uuid,
    member_id: Uuid,
    roles: &[String],
) -> ApiResult<MembershipActionResponse> {
    let roles = parse_roles(roles)?;

    // Must precede the membership lookup
    let admin_of =
        CharityMembership::charity_ids_with_roles(&state.db, caller, &[CharityRole::Admin]).await?;
    if admin_of.is_empty() {
        return Err(ApiError::Forbidden(
            "You must be a charity admin to update member roles".to_string(),
        ));
    }

    let target = CharityMembership::find_by_id(&state.db, member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    if !admin_of.contains(&target.charity_id) {
        return Err(ApiError::Forbidden(
            "You can only manage members of charities you administer".to_string(),
        ));
    }

    if !roles.contains(&CharityRole::Admin) {
        ensure_not_sole_admin(
            state,
            &target,
            "Cannot remove the admin role from the only admin of this charity",
        )
        .await?;
    }

    let updated = CharityMembership::update_roles(
        &state.db,
        member_id,
        roles.iter().map(|r| r.as_str().to_string()).collect(),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(
        &mut conn,
        member_topic_jobs(updated.charity_id, updated.user_id, &updated.roles),
    )
    .await?;

    tracing::info!(member_id = %member_id, caller = %caller, roles = %role_list(&roles), "Member roles updated");

    Ok(MembershipActionResponse {
        membership: Some(updated),
        ..MembershipActionResponse::message("Member updated")
    })
}

async fn remove_member(
    state: &AppState,
    caller: Uuid,
    user_id: Uuid,
    charity_id: Uuid,
) -> ApiResult<MembershipActionResponse> {
    require_charity_admin(&state.db, caller, charity_id)
        .await
        .map_err(|_| {
            ApiError::Forbidden("You must be a charity admin to remove members".to_string())
        })?;

    if caller == user_id {
        return Err(ApiError::BadRequest(
            "Use the leave action to remove yourself".to_string(),
        ));
    }

    let target = CharityMembership::find(&state.db, user_id, charity_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    ensure_not_sole_admin(state, &target, "Cannot remove the only admin of this charity").await?;

    CharityMembership::delete(&state.db, user_id, charity_id).await?;
    tracing::info!(user_id = %user_id, charity_id = %charity_id, caller = %caller, "Member removed");

    Ok(MembershipActionResponse::message("Member removed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_tags() {
        let id = Uuid::new_v4();

        let join: MembershipAction = serde_json::from_value(json!({
            "action": "join",
            "charity_id": id,
            "roles": ["volunteer"],
        }))
        .unwrap();
        assert!(matches!(join, MembershipAction::Join { charity_id, ref permissions, .. } if charity_id == id && permissions.is_empty()));

        let update: MembershipAction = serde_json::from_value(json!({
            "action": "updateMember",
            "member_id": id,
            "roles": ["editor"],
        }))
        .unwrap();
        assert!(matches!(update, MembershipAction::UpdateMember { .. }));

        let review: MembershipAction = serde_json::from_value(json!({
            "action": "review",
            "application_id": id,
            "status": "ACCEPTED",
        }))
        .unwrap();
        assert!(matches!(
            review,
            MembershipAction::Review { status: CharityApplicationStatus::Accepted, .. }
        ));

        assert!(serde_json::from_value::<MembershipAction>(json!({ "action": "promote" })).is_err());
    }

    #[test]
    fn test_parse_roles() {
        let roles = parse_roles(&[
            "editor".to_string(),
            "volunteer".to_string(),
            "editor".to_string(),
        ])
        .unwrap();
        assert_eq!(roles, vec![CharityRole::Editor, CharityRole::Volunteer]);
        assert_eq!(role_list(&roles), "editor, volunteer");

        assert!(matches!(parse_roles(&[]), Err(ApiError::BadRequest(_))));
        assert!(matches!(
            parse_roles(&["owner".to_string()]),
            Err(ApiError::BadRequest(msg)) if msg == "Unknown role: owner"
        ));
    }
}
