/// API route handlers, one module per resource
///
/// - `health`: liveness and dependency status
/// - `auth`: OIDC login, token refresh, logout
/// - `users`: profile and onboarding
/// - `charities`: charity CRUD and listings
/// - `memberships`: join, apply, review and member management
/// - `tasks`: task CRUD, explore and dashboard listings
/// - `applications`: task applications and their status actions
/// - `comments`: threaded task comments
/// - `search`: multi-index search
/// - `notifications`: in-app feed
/// - `uploads`: signed URLs and object deletion

pub mod applications;
pub mod auth;
pub mod charities;
pub mod comments;
pub mod health;
pub mod memberships;
pub mod notifications;
pub mod search;
pub mod tasks;
pub mod uploads;
pub mod users;
