/// HTTP middleware
///
/// - [`security`]: response security headers
/// - [`rate_limit`]: per-user token bucket in Redis

pub mod rate_limit;
pub mod security;
