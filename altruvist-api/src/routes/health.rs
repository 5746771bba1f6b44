/// Health check
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "redis": "connected",
///   "pool": { "active_connections": 1, "idle_connections": 4, "total_connections": 5 }
/// }
/// ```

use crate::{app::AppState, error::ApiResult};
use altruvist_shared::db::pool::{get_pool_stats, health_check as db_health_check, PoolStats};
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` when every dependency answers, otherwise `degraded`
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub redis: &'static str,
    pub pool: PoolStats,
}

fn describe(ok: bool) -> &'static str {
    if ok {
        "connected"
    } else {
        "disconnected"
    }
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database_ok = db_health_check(&state.db).await.is_ok();
    let redis_ok = matches!(state.redis.ping().await, Ok(true));

    if !database_ok || !redis_ok {
        tracing::warn!(database_ok, redis_ok, "Health check degraded");
    }

    Ok(Json(HealthResponse {
        status: if database_ok && redis_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: describe(database_ok),
        redis: describe(redis_ok),
        pool: get_pool_stats(&state.db),
    }))
}
