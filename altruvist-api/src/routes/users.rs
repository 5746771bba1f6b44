/// User profile endpoints
///
/// # Endpoints
///
/// - `GET /v1/users/me` - current user with memberships
/// - `POST /v1/users/me/onboarding` - pick a role and fill the profile
/// - `PATCH /v1/users/me` - update profile
/// - `DELETE /v1/users/me` - delete the account
/// - `GET /v1/users/:id` - public profile

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    jobs,
    routes::charities,
};
use altruvist_shared::{
    auth::middleware::AuthContext,
    integrations::search::USERS_INDEX,
    models::{
        charity::{Charity, CreateCharity},
        membership::CharityMembership,
        outbox::JobPayload,
        user::{Onboarding, UpdateUser, User, UserRole},
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub memberships: Vec<CharityMembership>,
    pub charities: Vec<Charity>,
}

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    #[serde(flatten)]
    pub profile: Onboarding,

    /// Required for the charity role
    pub charity: Option<CreateCharity>,
}

#[derive(Debug, Serialize)]
pub struct OnboardingResponse {
    pub user: User,
    pub charity: Option<Charity>,
}

/// Public subset of a user
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub roles: Vec<String>,
    pub user_title: Option<String>,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub preferred_charities: Vec<String>,
    pub profile_picture: Option<String>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            roles: user.roles,
            user_title: user.user_title,
            bio: user.bio,
            skills: user.skills,
            preferred_charities: user.preferred_charities,
            profile_picture: user.profile_picture,
        }
    }
}

async fn current_user(state: &AppState, user_id: Uuid) -> ApiResult<User> {
    User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub async fn me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<MeResponse>> {
    let user = current_user(&state, auth.user_id).await?;
    let memberships = CharityMembership::list_for_user(&state.db, auth.user_id).await?;
    let charities = Charity::list_for_user(&state.db, auth.user_id).await?;

    Ok(Json(MeResponse {
        user,
        memberships,
        charities,
    }))
}

/// Completes onboarding.
///
/// Charity users must submit the charity they represent; it is created in the
/// same transaction with the user as its admin.
///
/// # Errors
///
/// - `400 Bad Request`: charity role without charity details
/// - `409 Conflict`: onboarding already completed
pub async fn onboarding(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<OnboardingRequest>,
) -> ApiResult<(StatusCode, Json<OnboardingResponse>)> {
    req.profile.validate()?;

    let existing = current_user(&state, auth.user_id).await?;
    if !existing.roles.is_empty() {
        return Err(ApiError::Conflict("Onboarding already completed".to_string()));
    }

    let charity_data = match (req.profile.role, req.charity) {
        (UserRole::Charity, None) => {
            return Err(ApiError::BadRequest(
                "Charity details are required for the charity role".to_string(),
            ))
        }
        (UserRole::Charity, Some(data)) => {
            data.validate()?;
            Some(data)
        }
        (UserRole::Volunteer, _) => {
            if req.profile.skills.is_empty() {
                return Err(ApiError::BadRequest("Please select at least one skill".to_string()));
            }
            None
        }
    };

    let mut tx = state.db.begin().await?;

    let user = User::complete_onboarding(&mut *tx, auth.user_id, &req.profile)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let charity = match charity_data {
        Some(data) => Some(charities::create_with_admin(&mut tx, data, auth.user_id).await?),
        None => None,
    };

    jobs::enqueue_all(&mut tx, vec![jobs::index(USERS_INDEX, &user)?]).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, role = req.profile.role.as_str(), "Onboarding completed");

    Ok((StatusCode::OK, Json(OnboardingResponse { user, charity })))
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateUser>,
) -> ApiResult<Json<User>> {
    req.validate()?;
    let existing = current_user(&state, auth.user_id).await?;
    req.validate_for(&existing)?;

    let user = User::update_profile(&state.db, auth.user_id, req)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let mut conn = state.db.acquire().await?;
    jobs::enqueue_all(&mut conn, vec![jobs::index(USERS_INDEX, &user)?]).await?;

    Ok(Json(user))
}

/// Deletes the account.
///
/// Charities the user created are kept; their `created_by` is cleared.
pub async fn delete_me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;

    if !User::delete(&mut *tx, auth.user_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    jobs::enqueue_all(
        &mut tx,
        vec![
            JobPayload::DeleteSubscriber {
                subscriber_id: auth.user_id.to_string(),
            },
            jobs::remove(USERS_INDEX, auth.user_id),
        ],
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, "Account deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PublicProfile>> {
    let user = current_user(&state, id).await?;
    Ok(Json(user.into()))
}
