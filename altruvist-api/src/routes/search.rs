/// `GET /v1/search?query=` across tasks, users and charities

use crate::{app::AppState, error::ApiResult};
use altruvist_shared::integrations::search::SearchResults;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

/// # Errors
///
/// - `400 Bad Request`: query shorter than 2 or longer than 100 characters
/// - `503 Service Unavailable`: Meilisearch is down
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<SearchResults>> {
    let results = state.search.search_all(&params.query).await?;

    tracing::debug!(
        query = %params.query,
        tasks = results.tasks.len(),
        users = results.users.len(),
        charities = results.charities.len(),
        "Search completed"
    );

    Ok(Json(results))
}
