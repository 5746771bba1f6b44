/// Object storage access for uploaded files
///
/// # Endpoints
///
/// - `GET /v1/uploads/signed-url?file=&extract=` - presigned GET URL
/// - `DELETE /v1/uploads?key=` - delete an object

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use altruvist_shared::{auth::middleware::AuthContext, integrations::storage::extract_key};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    pub file: String,

    /// `file` is a full S3 URL rather than a key
    #[serde(default)]
    pub extract: bool,
}

#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub key: String,
}

/// # Errors
///
/// - `400 Bad Request`: the file reference yields no key
/// - `500 Internal Server Error`: signing failed
pub async fn signed_url(
    State(state): State<AppState>,
    Query(query): Query<SignedUrlQuery>,
) -> ApiResult<Json<SignedUrlResponse>> {
    if extract_key(&query.file, query.extract).is_none() {
        return Err(ApiError::BadRequest("Invalid file reference".to_string()));
    }

    let url = state
        .storage
        .signed_url(&query.file, query.extract)
        .await
        .ok_or_else(|| ApiError::internal("Failed to sign object URL"))?;

    Ok(Json(SignedUrlResponse { url }))
}

pub async fn delete_object(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<StatusCode> {
    state.storage.delete_object(&query.key).await?;
    tracing::info!(user_id = %auth.user_id, key = %query.key, "Upload deleted");
    Ok(StatusCode::NO_CONTENT)
}
