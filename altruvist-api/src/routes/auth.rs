/// Login through Zitadel and session token endpoints
///
/// # Endpoints
///
/// - `GET /v1/auth/login` - start an authorization-code + PKCE login
/// - `GET /v1/auth/callback` - finish the login, issue session tokens
/// - `POST /v1/auth/refresh` - new access token from a refresh token
/// - `GET /v1/auth/logout` - provider end-session URL

use crate::{app::AppState, error::ApiResult, jobs};
use altruvist_shared::{
    auth::{jwt, oidc},
    integrations::notifications::split_name,
    models::{
        outbox::JobPayload,
        user::{CreateUser, User},
    },
};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub authorization_url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: jwt::TokenPair,

    /// Kept by the client for the logout hint
    pub id_token: Option<String>,

    /// True until the user picks a role
    pub onboarding_required: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    pub id_token_hint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logout_url: String,
}

/// Starts a login. The PKCE verifier is kept in Redis for ten minutes.
pub async fn login(State(state): State<AppState>) -> ApiResult<Json<LoginResponse>> {
    let pkce = oidc::PkceChallenge::generate();
    let login_state = oidc::generate_state();

    oidc::store_pkce(&state.redis, &login_state, &pkce.verifier).await?;
    let authorization_url = state.oidc.authorize_url(&login_state, &pkce)?;

    Ok(Json(LoginResponse {
        authorization_url,
        state: login_state,
    }))
}

/// Completes a login.
///
/// First-time users are created and registered as notification subscribers.
///
/// # Errors
///
/// - `400 Bad Request`: unknown, expired or reused state
/// - `401 Unauthorized`: the provider rejected the code
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<CallbackResponse>> {
    let verifier = oidc::take_pkce(&state.redis, &query.state).await?;
    let provider_tokens = state.oidc.exchange_code(&query.code, &verifier).await?;
    let info = state.oidc.fetch_userinfo(&provider_tokens.access_token).await?;

    let name = info.display_name();
    let (user, created) = User::upsert_from_identity(
        &state.db,
        CreateUser {
            zitadel_id: info.sub.clone(),
            email: info.email.clone(),
            name: name.clone(),
            locale: info.locale.clone(),
        },
    )
    .await?;

    if created {
        let (first_name, last_name) = split_name(&name);
        let mut conn = state.db.acquire().await?;
        jobs::enqueue_all(
            &mut conn,
            vec![JobPayload::CreateSubscriber {
                subscriber_id: user.id.to_string(),
                email: user.email.clone(),
                first_name,
                last_name,
            }],
        )
        .await?;
        tracing::info!(user_id = %user.id, "New user signed up");
    }

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;
    let onboarding_required = user.roles.is_empty();

    Ok(Json(CallbackResponse {
        user,
        tokens,
        id_token: provider_tokens.id_token,
        onboarding_required,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse {
        access_token,
        token_type: "Bearer",
        expires_in: jwt::TokenType::Access.default_expiration().num_seconds(),
    }))
}

/// Session tokens are stateless; the client drops them and follows the URL.
pub async fn logout(
    State(state): State<AppState>,
    Query(query): Query<LogoutQuery>,
) -> ApiResult<Json<LogoutResponse>> {
    let logout_url = state
        .oidc
        .end_session_url(query.id_token_hint.as_deref(), &oidc::generate_state())?;

    Ok(Json(LogoutResponse { logout_url }))
}
