/// Per-user rate limiting for authenticated routes
///
/// A token bucket per user lives in Redis under `ratelimit:{user_id}` and is
/// refilled and drained atomically by a Lua script. Capacity equals
/// `RATE_LIMIT_PER_MINUTE`; tokens refill evenly over a minute.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: bucket capacity
/// - `X-RateLimit-Remaining`: tokens left after this request
/// - `Retry-After`: seconds to wait (429 only)
///
/// When Redis is unreachable the request is let through and a warning logged.

use crate::app::AppState;
use crate::error::ApiError;
use altruvist_shared::auth::middleware::AuthContext;
use axum::{
    extract::{Extension, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

const BUCKET_TTL_SECS: u64 = 120;

const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

tokens = math.min(capacity, tokens + (math.max(0, now - last_refill) * refill_rate))

if tokens >= 1 then
    tokens = tokens - 1
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, ttl)
    return {1, math.floor(tokens), 0}
else
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, ttl)
    return {0, 0, math.ceil((1 - tokens) / refill_rate)}
end
"#;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub bucket_capacity: u32,

    /// Tokens per second
    pub refill_rate: f64,
}

impl RateLimit {
    pub fn per_minute(requests: u32) -> Self {
        let requests = requests.max(1);
        Self {
            bucket_capacity: requests,
            refill_rate: f64::from(requests) / 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: u64,
}

impl RateLimitResult {
    fn from_script(raw: &[i64]) -> Option<Self> {
        match raw {
            [allowed, remaining, retry_after] => Some(Self {
                allowed: *allowed == 1,
                remaining: u32::try_from(*remaining).unwrap_or(0),
                retry_after: u64::try_from(*retry_after).unwrap_or(1).max(1),
            }),
            _ => None,
        }
    }
}

fn bucket_key(user_id: Uuid) -> String {
    format!("ratelimit:{user_id}")
}

async fn check(state: &AppState, user_id: Uuid, limit: RateLimit) -> Option<RateLimitResult> {
    let mut conn = state.redis.get_connection();
    let result: Result<Vec<i64>, _> = redis::Script::new(TOKEN_BUCKET_SCRIPT)
        .key(bucket_key(user_id))
        .arg(limit.bucket_capacity)
        .arg(limit.refill_rate)
        .arg(Utc::now().timestamp())
        .arg(BUCKET_TTL_SECS)
        .invoke_async(&mut conn)
        .await;

    match result {
        Ok(raw) => RateLimitResult::from_script(&raw),
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, "Rate limit check failed, allowing request");
            None
        }
    }
}

pub async fn rate_limit_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = RateLimit::per_minute(state.config.api.rate_limit_per_minute);

    let Some(result) = check(&state, auth.user_id, limit).await else {
        return Ok(next.run(request).await);
    };

    if !result.allowed {
        tracing::debug!(user_id = %auth.user_id, retry_after = result.retry_after, "Rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after: result.retry_after,
            message: format!(
                "Rate limit exceeded. Try again in {} seconds",
                result.retry_after
            ),
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit.bucket_capacity));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_minute() {
        let limit = RateLimit::per_minute(120);
        assert_eq!(limit.bucket_capacity, 120);
        assert_eq!(limit.refill_rate, 2.0);

        assert_eq!(RateLimit::per_minute(0).bucket_capacity, 1);
    }

    #[test]
    fn test_result_from_script() {
        assert_eq!(
            RateLimitResult::from_script(&[1, 41, 0]),
            Some(RateLimitResult {
                allowed: true,
                remaining: 41,
                retry_after: 1
            })
        );

        let denied = RateLimitResult::from_script(&[0, 0, 7]).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, 7);

        assert_eq!(RateLimitResult::from_script(&[1]), None);
    }

    #[test]
    fn test_bucket_key() {
        let id = Uuid::nil();
        assert_eq!(bucket_key(id), "ratelimit:00000000-0000-0000-0000-000000000000");
    }
}
