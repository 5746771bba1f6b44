/// Redis access for short-lived state
///
/// Redis holds data that may be lost without harm:
///
/// ```text
/// oidc:state:{state}     PKCE verifier for an in-flight login (TTL 600s)
/// ratelimit:{user_id}    token bucket for API rate limiting (TTL 120s)
/// ```
///
/// # Example
///
/// ```no_run
/// use altruvist_shared::redis::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::from_env()?).await?;
/// assert!(client.ping().await?);
/// # Ok(())
/// # }
/// ```

pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig};
